//! RasterLab: a raster image editing engine.
//!
//! Pixels live in a [`PixelBuffer`] of normalized RGBA floats. Every edit is an
//! [`Operation`] executed by the [`Engine`], which keeps an undo/redo history
//! of committed images and a preview session for live adjustments. Heavy
//! per-pixel work is split into horizontal stripes by the
//! [`Scheduler`](ops::scheduler::Scheduler).

pub mod buffer;
pub mod cli;
pub mod components;
pub mod engine;
pub mod error;
pub mod io;
pub mod logger;
pub mod ops;
pub mod settings;

pub use buffer::PixelBuffer;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use ops::adjustments::AdjustParam;
pub use ops::blend::BlendMode;
pub use ops::scheduler::Scheduler;
pub use ops::{ExecContext, Operation};
pub use settings::EngineSettings;
