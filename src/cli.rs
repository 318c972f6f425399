// ============================================================================
// history-brush CLI — headless replay of recorded pointer sessions
// ============================================================================
//
// Usage examples:
//   history-brush --script strokes.json --output mask.png
//   history-brush -s strokes.json --data-uri            (print the mask URI)
//   history-brush -s strokes.json -o mask.png --max-history 20 --verbose
//
// The script drives a MaskSession exactly as a host UI would: brush changes,
// pointer events in client coordinates, undo/redo, resets and resizes.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use serde::Deserialize;

use crate::canvas::SurfaceRect;
use crate::components::history::HistoryLimits;
use crate::components::tools::BrushProperties;
use crate::io::{MaskError, write_png};
use crate::session::{HistoryControl, MaskObserver, MaskSession, NullObserver, PointerEvent};
use crate::{log_err, log_info};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// history-brush headless mask renderer.
#[derive(Parser, Debug)]
#[command(
    name = "history-brush",
    about = "Replay a recorded brush session and export the resulting mask",
    long_about = "Replays a JSON event script (brush changes, pointer down/move/up/leave,\n\
                  undo, redo, reset, resize) through the masking engine and writes\n\
                  the final mask as a PNG file and/or a PNG data URI.\n\n\
                  Example:\n  \
                  history-brush --script strokes.json --output mask.png"
)]
pub struct CliArgs {
    /// JSON event script to replay.
    #[arg(short, long, value_name = "SCRIPT.json")]
    pub script: PathBuf,

    /// Write the final mask to this PNG file.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Print the final mask as a data:image/png;base64 URI on stdout.
    #[arg(long)]
    pub data_uri: bool,

    /// Override the canvas width given in the script.
    #[arg(long)]
    pub width: Option<u32>,

    /// Override the canvas height given in the script.
    #[arg(long)]
    pub height: Option<u32>,

    /// Maximum undo entries to keep (including the blank base). Unlimited when omitted.
    #[arg(long, value_name = "N")]
    pub max_history: Option<usize>,

    /// Maximum megabytes of history to keep. Unlimited when omitted.
    #[arg(long, value_name = "MB")]
    pub max_history_mb: Option<usize>,

    /// Report every history transition and timing information.
    #[arg(short, long)]
    pub verbose: bool,

    /// Write a session log to the platform data directory.
    #[arg(long)]
    pub log: bool,
}

impl CliArgs {
    pub fn limits(&self) -> HistoryLimits {
        HistoryLimits {
            max_entries: self.max_history,
            max_memory_bytes: self.max_history_mb.map(|mb| mb.saturating_mul(1024 * 1024)),
        }
    }
}

// ============================================================================
// Replay script
// ============================================================================

/// A recorded session.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ReplayScript {
    pub width: u32,
    pub height: u32,
    /// Initial surface rectangle; defaults to the canvas at 1:1.
    #[serde(default)]
    pub surface: Option<SurfaceRect>,
    pub events: Vec<ScriptEvent>,
}

/// One scripted host action.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ScriptEvent {
    Brush(BrushProperties),
    Down([f32; 2]),
    Move([f32; 2]),
    Up,
    Leave,
    Undo,
    Redo,
    Reset,
    /// New surface layout; `null` means the surface is unmounted.
    Surface(Option<SurfaceRect>),
    /// The hosting image changed size; pairs with a reset.
    Resize([u32; 2]),
}

pub fn parse_script(source: &str) -> Result<ReplayScript, MaskError> {
    let script: ReplayScript = serde_json::from_str(source)?;
    if script.width == 0 || script.height == 0 {
        return Err(MaskError::Script(format!(
            "canvas must have a non-zero size, got {}x{}",
            script.width, script.height
        )));
    }
    Ok(script)
}

pub fn load_script(path: &Path) -> Result<ReplayScript, MaskError> {
    let source = std::fs::read_to_string(path)?;
    parse_script(&source)
}

/// Run every event of `script` through a fresh session.
pub fn replay(
    script: &ReplayScript,
    limits: HistoryLimits,
    observer: Box<dyn MaskObserver>,
) -> MaskSession {
    let mut session = MaskSession::with_limits(script.width, script.height, limits, observer);
    let mut surface = Some(
        script
            .surface
            .unwrap_or_else(|| SurfaceRect::native(script.width, script.height)),
    );
    let mut token = session.reset_token();

    for event in &script.events {
        match event {
            ScriptEvent::Brush(brush) => session.set_brush(*brush),
            ScriptEvent::Down([x, y]) => {
                session.handle_pointer(PointerEvent::Down { x: *x, y: *y }, surface)
            }
            ScriptEvent::Move([x, y]) => {
                session.handle_pointer(PointerEvent::Move { x: *x, y: *y }, surface)
            }
            ScriptEvent::Up => session.handle_pointer(PointerEvent::Up, surface),
            ScriptEvent::Leave => session.handle_pointer(PointerEvent::Leave, surface),
            ScriptEvent::Undo => {
                session.undo();
            }
            ScriptEvent::Redo => {
                session.redo();
            }
            ScriptEvent::Reset => session.reset(),
            ScriptEvent::Surface(rect) => surface = *rect,
            ScriptEvent::Resize([w, h]) => {
                token += 1;
                session.sync_host(*w, *h, token);
            }
        }
    }
    session
}

/// Prints history transitions as they happen.
struct ConsoleObserver;

impl MaskObserver for ConsoleObserver {
    fn on_mask_change(&mut self, data_uri: &str) {
        println!("  mask updated ({} bytes encoded)", data_uri.len());
    }

    fn on_undo_state_change(&mut self, can_undo: bool) {
        println!("  can undo: {}", can_undo);
    }

    fn on_redo_state_change(&mut self, can_redo: bool) {
        println!("  can redo: {}", can_redo);
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the replay and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let mut script = match load_script(&args.script) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not load script '{}': {}", args.script.display(), e);
            log_err!("Could not load script {}: {}", args.script.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(w) = args.width {
        script.width = w;
    }
    if let Some(h) = args.height {
        script.height = h;
    }
    if script.width == 0 || script.height == 0 {
        eprintln!("error: canvas must have a non-zero size");
        return ExitCode::FAILURE;
    }

    let observer: Box<dyn MaskObserver> = if args.verbose {
        Box::new(ConsoleObserver)
    } else {
        Box::new(NullObserver)
    };

    let start = Instant::now();
    let session = replay(&script, args.limits(), observer);
    log_info!(
        "Replayed {} events from {} in {:.1} ms",
        script.events.len(),
        args.script.display(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    if args.verbose {
        let history = session.history();
        let (w, h) = session.raster().dimensions();
        println!(
            "{} events, {}x{} mask, {} undo / {} redo entries, {:.2} MB history, coverage {:.1}% ({:.1} ms)",
            script.events.len(),
            w,
            h,
            history.undo_count(),
            history.redo_count(),
            history.memory_usage() as f64 / (1024.0 * 1024.0),
            session.raster().coverage() * 100.0,
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    if let Some(path) = &args.output {
        if let Err(e) = write_png(session.raster(), path) {
            eprintln!("error: could not write '{}': {}", path.display(), e);
            log_err!("Could not write mask {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
        if args.verbose {
            println!("wrote {}", path.display());
        }
    }

    if args.data_uri {
        match session.export_data_uri() {
            Ok(uri) => println!("{}", uri),
            Err(e) => {
                eprintln!("error: could not encode mask: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if args.output.is_none() && !args.data_uri {
        eprintln!("warning: neither --output nor --data-uri given; nothing was exported");
    }

    ExitCode::SUCCESS
}
