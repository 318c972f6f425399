use uuid::Uuid;

use crate::canvas::{MaskRaster, SurfaceRect, screen_to_canvas};
use crate::components::history::{HistoryFlags, HistoryLimits, HistoryManager};
use crate::components::tools::{BrushProperties, StrokeRasterizer};
use crate::io::{MaskError, encode_data_uri};
use crate::{log_err, log_info, log_warn};

// ============================================================================
// HOST-FACING INTERFACES
// ============================================================================

/// Receives everything the session reports back to its host.
/// All methods default to no-ops so hosts implement only what they use.
pub trait MaskObserver {
    /// A stroke was committed or an undo/redo restored the raster.
    fn on_mask_change(&mut self, _data_uri: &str) {}
    fn on_undo_state_change(&mut self, _can_undo: bool) {}
    fn on_redo_state_change(&mut self, _can_redo: bool) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl MaskObserver for NullObserver {}

/// Observer assembled from optional closures, one per notification.
#[derive(Default)]
pub struct MaskCallbacks {
    pub on_mask_change: Option<Box<dyn FnMut(&str)>>,
    pub on_undo_state_change: Option<Box<dyn FnMut(bool)>>,
    pub on_redo_state_change: Option<Box<dyn FnMut(bool)>>,
}

impl MaskObserver for MaskCallbacks {
    fn on_mask_change(&mut self, data_uri: &str) {
        if let Some(cb) = self.on_mask_change.as_mut() {
            cb(data_uri);
        }
    }

    fn on_undo_state_change(&mut self, can_undo: bool) {
        if let Some(cb) = self.on_undo_state_change.as_mut() {
            cb(can_undo);
        }
    }

    fn on_redo_state_change(&mut self, can_redo: bool) {
        if let Some(cb) = self.on_redo_state_change.as_mut() {
            cb(can_redo);
        }
    }
}

/// The undo/redo handle a host holds on to.
pub trait HistoryControl {
    /// Returns `true` if the raster changed.
    fn undo(&mut self) -> bool;
    /// Returns `true` if the raster changed.
    fn redo(&mut self) -> bool;
}

/// One pointer or touch event in client coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up,
    Leave,
}

// ============================================================================
// MASK SESSION
// ============================================================================

/// One masking surface: a raster, its history and the stroke in progress.
///
/// Everything runs on the caller's thread, one event at a time. Undo and redo
/// are refused while a stroke is in progress so the rasterizer and history
/// restore never write the raster at the same time.
pub struct MaskSession {
    id: Uuid,
    raster: MaskRaster,
    history: HistoryManager,
    stroke: StrokeRasterizer,
    brush: BrushProperties,
    reset_token: u64,
    observer: Box<dyn MaskObserver>,
}

impl MaskSession {
    pub fn new(width: u32, height: u32, observer: Box<dyn MaskObserver>) -> Self {
        Self::with_limits(width, height, HistoryLimits::default(), observer)
    }

    pub fn with_limits(
        width: u32,
        height: u32,
        limits: HistoryLimits,
        observer: Box<dyn MaskObserver>,
    ) -> Self {
        let mut session = Self {
            id: Uuid::new_v4(),
            raster: MaskRaster::new(width, height),
            history: HistoryManager::new(limits),
            stroke: StrokeRasterizer::new(),
            brush: BrushProperties::default(),
            reset_token: 0,
            observer,
        };
        session.initialize(width, height);
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn raster(&self) -> &MaskRaster {
        &self.raster
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn brush(&self) -> BrushProperties {
        self.brush
    }

    /// Brush used by the next stroke. A stroke already in progress keeps the
    /// settings it started with.
    pub fn set_brush(&mut self, brush: BrushProperties) {
        self.brush = brush;
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke.is_active()
    }

    /// Dabs stamped by the current or most recent stroke.
    pub fn stroke_dabs(&self) -> usize {
        self.stroke.dab_count()
    }

    pub fn flags(&self) -> HistoryFlags {
        self.history.flags()
    }

    pub fn reset_token(&self) -> u64 {
        self.reset_token
    }

    /// Start over with a blank `width` x `height` raster and a single history
    /// entry. Any stroke in progress is dropped without being committed.
    pub fn initialize(&mut self, width: u32, height: u32) {
        self.stroke.end();
        self.raster = MaskRaster::new(width, height);
        let flags = self.history.initialize(&self.raster);
        log_info!(session = self.id; "initialized at {}x{}", width, height);
        self.emit_flags(flags);
    }

    /// Explicit "reset mask": blank raster at the current size.
    pub fn reset(&mut self) {
        let (w, h) = self.raster.dimensions();
        self.initialize(w, h);
    }

    /// Apply the host image's current dimensions and reset token. Resets when
    /// either differs from what the session last saw; returns whether it did.
    pub fn sync_host(&mut self, width: u32, height: u32, reset_token: u64) -> bool {
        if self.raster.dimensions() == (width, height) && self.reset_token == reset_token {
            return false;
        }
        self.reset_token = reset_token;
        self.initialize(width, height);
        true
    }

    // ------------------------------------------------------------------------
    // Pointer input
    // ------------------------------------------------------------------------

    /// Route one event. `rect` is the surface's on-screen rectangle at the
    /// time of the event, or `None` while it is not laid out.
    pub fn handle_pointer(&mut self, event: PointerEvent, rect: Option<SurfaceRect>) {
        match event {
            PointerEvent::Down { x, y } => self.pointer_down((x, y), rect),
            PointerEvent::Move { x, y } => self.pointer_move((x, y), rect),
            PointerEvent::Up => self.pointer_up(),
            PointerEvent::Leave => self.pointer_leave(),
        }
    }

    pub fn pointer_down(&mut self, client: (f32, f32), rect: Option<SurfaceRect>) {
        if self.stroke.is_active() {
            return;
        }
        let Some(point) = self.map(client, rect) else {
            return;
        };
        self.stroke.begin(&mut self.raster, self.brush, point);
    }

    pub fn pointer_move(&mut self, client: (f32, f32), rect: Option<SurfaceRect>) {
        if !self.stroke.is_active() {
            return;
        }
        if let Some(point) = self.map(client, rect) {
            self.stroke.extend(&mut self.raster, point);
        }
    }

    pub fn pointer_up(&mut self) {
        self.finish_stroke();
    }

    /// Leaving the surface ends the stroke exactly like releasing the pointer.
    pub fn pointer_leave(&mut self) {
        self.finish_stroke();
    }

    fn map(&self, client: (f32, f32), rect: Option<SurfaceRect>) -> Option<(f32, f32)> {
        let (w, h) = self.raster.dimensions();
        screen_to_canvas(client, rect, w, h)
    }

    fn finish_stroke(&mut self) {
        if !self.stroke.end() {
            return;
        }
        let flags = self.history.commit(&self.raster);
        log_info!(
            session = self.id;
            "stroke committed ({} dabs, {} entries, {} bytes)",
            self.stroke.dab_count(),
            self.history.undo_count(),
            self.history.memory_usage()
        );
        self.publish_mask();
        self.emit_flags(flags);
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// Encode the live raster the same way `on_mask_change` receives it.
    pub fn export_data_uri(&self) -> Result<String, MaskError> {
        encode_data_uri(&self.raster)
    }

    fn publish_mask(&mut self) {
        match encode_data_uri(&self.raster) {
            Ok(uri) => self.observer.on_mask_change(&uri),
            Err(e) => {
                log_err!(session = self.id; "export failed: {}", e);
            }
        }
    }

    fn emit_flags(&mut self, flags: HistoryFlags) {
        self.observer.on_undo_state_change(flags.can_undo);
        self.observer.on_redo_state_change(flags.can_redo);
    }
}

impl HistoryControl for MaskSession {
    fn undo(&mut self) -> bool {
        if self.stroke.is_active() {
            log_warn!(session = self.id; "undo ignored while drawing");
            return false;
        }
        match self.history.undo(&mut self.raster) {
            Some(flags) => {
                self.publish_mask();
                self.emit_flags(flags);
                true
            }
            None => false,
        }
    }

    fn redo(&mut self) -> bool {
        if self.stroke.is_active() {
            log_warn!(session = self.id; "redo ignored while drawing");
            return false;
        }
        match self.history.redo(&mut self.raster) {
            Some(flags) => {
                self.publish_mask();
                self.emit_flags(flags);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        masks: usize,
        can_undo: Vec<bool>,
        can_redo: Vec<bool>,
    }

    fn recorded(width: u32, height: u32) -> (MaskSession, Rc<RefCell<Log>>) {
        let log = Rc::new(RefCell::new(Log::default()));
        let (a, b, c) = (log.clone(), log.clone(), log.clone());
        let callbacks = MaskCallbacks {
            on_mask_change: Some(Box::new(move |_| a.borrow_mut().masks += 1)),
            on_undo_state_change: Some(Box::new(move |v| b.borrow_mut().can_undo.push(v))),
            on_redo_state_change: Some(Box::new(move |v| c.borrow_mut().can_redo.push(v))),
        };
        (MaskSession::new(width, height, Box::new(callbacks)), log)
    }

    fn native(session: &MaskSession) -> Option<SurfaceRect> {
        let (w, h) = session.raster().dimensions();
        Some(SurfaceRect::native(w, h))
    }

    #[test]
    fn construction_reports_empty_history() {
        let (session, log) = recorded(40, 30);
        assert_eq!(log.borrow().can_undo, vec![false]);
        assert_eq!(log.borrow().can_redo, vec![false]);
        assert_eq!(log.borrow().masks, 0);
        assert!(session.raster().is_blank());
    }

    #[test]
    fn down_on_unmounted_surface_starts_nothing() {
        let (mut session, log) = recorded(40, 30);
        session.pointer_down((5.0, 5.0), None);
        assert!(!session.is_stroking());
        session.pointer_up();
        assert_eq!(session.history().undo_count(), 1);
        assert_eq!(log.borrow().masks, 0);
    }

    #[test]
    fn move_sample_without_geometry_is_skipped() {
        let (mut session, _log) = recorded(100, 20);
        let rect = native(&session);
        session.set_brush(BrushProperties::new(10.0, 100.0, Default::default()));
        session.pointer_down((5.0, 10.0), rect);
        session.pointer_move((95.0, 10.0), None);
        assert_eq!(session.stroke_dabs(), 1);
        assert!(session.is_stroking());
        session.pointer_up();
        assert!(!session.is_stroking());
    }

    #[test]
    fn undo_refused_mid_stroke() {
        let (mut session, _log) = recorded(40, 30);
        let rect = native(&session);
        session.pointer_down((10.0, 10.0), rect);
        session.pointer_up();
        session.pointer_down((20.0, 20.0), rect);
        assert!(!session.undo());
        assert!(!session.redo());
        session.pointer_leave();
        assert!(session.undo());
        assert_eq!(session.history().undo_count(), 2);
    }

    #[test]
    fn brush_change_mid_stroke_waits_for_next_stroke() {
        let (mut session, _log) = recorded(100, 100);
        let rect = native(&session);
        session.set_brush(BrushProperties::new(10.0, 100.0, Default::default()));
        session.pointer_down((50.0, 50.0), rect);
        session.set_brush(BrushProperties::new(80.0, 100.0, Default::default()));
        session.pointer_move((50.0, 51.0), rect);
        session.pointer_up();
        // a 10px brush never reaches 20px away from the path
        assert!(session.raster().get_pixel(70, 50).0 == [0, 0, 0, 255]);
        assert_eq!(session.brush().size, 80.0);
    }

    #[test]
    fn sync_host_resets_only_on_change() {
        let (mut session, log) = recorded(40, 30);
        let rect = native(&session);
        session.pointer_down((10.0, 10.0), rect);
        session.pointer_up();
        assert!(!session.sync_host(40, 30, 0));
        assert!(session.history().can_undo());
        assert!(session.sync_host(40, 30, 1));
        assert!(!session.history().can_undo());
        assert!(session.raster().is_blank());
        assert!(session.sync_host(80, 60, 1));
        assert_eq!(session.raster().dimensions(), (80, 60));
        assert_eq!(log.borrow().can_undo.last(), Some(&false));
    }

    #[test]
    fn reset_mid_stroke_drops_the_stroke() {
        let (mut session, log) = recorded(40, 30);
        let rect = native(&session);
        session.pointer_down((10.0, 10.0), rect);
        session.reset();
        assert!(!session.is_stroking());
        session.pointer_up();
        assert_eq!(session.history().undo_count(), 1);
        assert_eq!(log.borrow().masks, 0);
    }
}
