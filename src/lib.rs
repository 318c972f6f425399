//! History-brush masking engine.
//!
//! A stroke-based mask editor: pointer samples are mapped into canvas pixels,
//! stamped as soft circular dabs, and every finished stroke is recorded as a
//! full-raster snapshot so the host can undo and redo. The mask leaves the
//! engine only as a PNG data URI handed to the host's observer.

pub mod logger;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod io;
pub mod session;

pub use canvas::{MaskRaster, SurfaceRect, screen_to_canvas};
pub use components::history::{HistoryFlags, HistoryLimits, HistoryManager, Snapshot};
pub use components::tools::{BrushMode, BrushProperties, StrokeRasterizer};
pub use io::MaskError;
pub use session::{HistoryControl, MaskCallbacks, MaskObserver, MaskSession, NullObserver, PointerEvent};
