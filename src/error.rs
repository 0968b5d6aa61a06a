//! Error types for the roster engine.

use thiserror::Error;

/// Main error type for roster engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Session used before `initialize`, or initialized with an unusable payload.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A schedule or blame buffer disagrees with staff count × horizon days.
    #[error("Shape mismatch: expected {expected} cells, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Interchange workbook is missing the sheets or columns of both formats.
    #[error("Import format error: {0}")]
    ImportFormat(String),

    /// A batch result arrived after its epoch was superseded.
    #[error("Stale batch result from epoch {result_epoch} (current epoch {current_epoch})")]
    StaleResult { result_epoch: u64, current_epoch: u64 },

    /// Staff list violates a roster invariant.
    #[error("Invalid roster: {0}")]
    InvalidRoster(String),

    /// Share payload could not be encoded or decoded.
    #[error("Share payload error: {0}")]
    Share(String),

    /// The optimizer worker has shut down.
    #[error("Optimizer worker is unavailable")]
    WorkerUnavailable,
}

impl EngineError {
    pub(crate) fn shape(expected: usize, actual: usize) -> Self {
        EngineError::ShapeMismatch { expected, actual }
    }
}

/// Result type alias for roster engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
