// ============================================================================
// ENGINE ERRORS: one taxonomy for every operation, I/O and history failure
// ============================================================================

use thiserror::Error;

use crate::ops::blend::BlendMode;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Convolution kernel is not an odd-sized square matrix.
    #[error("ill-formed kernel: {reason}")]
    MalformedKernel { reason: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("payload needs {required} bits but the carrier only holds {capacity}")]
    PayloadTooLarge { required: usize, capacity: usize },

    #[error("image is {found_w}x{found_h}, expected {expected_w}x{expected_h}")]
    DimensionMismatch {
        expected_w: u32,
        expected_h: u32,
        found_w: u32,
        found_h: u32,
    },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("no adjustment in progress")]
    NoActiveAdjustment,

    #[error("unknown adjustment parameter '{0}'")]
    UnknownAdjustment(String),

    #[error("blend mode {0} is not implemented")]
    BlendModeNotImplemented(BlendMode),

    #[error("image dimensions must be at least 1x1 (got {width}x{height})")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("project file error: {0}")]
    Project(String),
}

impl EngineError {
    pub fn mismatch(expected: (u32, u32), found: (u32, u32)) -> Self {
        EngineError::DimensionMismatch {
            expected_w: expected.0,
            expected_h: expected.1,
            found_w: found.0,
            found_h: found.1,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidOperation(msg.into())
    }
}

impl From<Box<bincode::ErrorKind>> for EngineError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        EngineError::Project(e.to_string())
    }
}
