//! Crate-wide error type for the sparse-volume pipeline.

use thiserror::Error;

/// Result type used across the pipeline.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced by the pipeline.
///
/// The variants map the four failure kinds of the pipeline contract:
/// invalid input, unsupported environment, I/O, and internal failures.
/// `NotFound` and `OutOfBounds` are split out because callers branch on
/// them (missing file vs. bad frame index).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed grid, mismatched channel count, bad descriptor. No side effects.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Missing engine library, no GPU device, unsupported platform.
    #[error("unsupported environment: {0}")]
    Unsupported(String),

    /// Compressed file or decoder missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Frame index outside the sequence's valid range.
    #[error("frame index {index} outside valid range [{start}, {end}]")]
    OutOfBounds { index: i32, start: i32, end: i32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GPU readback failure, allocator failure, engine-reported error.
    /// The owning manager must be released before retrying.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::InvalidInput(format!("malformed JSON: {}", err))
    }
}

impl From<bincode::Error> for PipelineError {
    fn from(err: bincode::Error) -> Self {
        PipelineError::Internal(format!("serialization failed: {}", err))
    }
}
