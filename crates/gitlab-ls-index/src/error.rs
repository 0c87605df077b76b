//! Index error types

use thiserror::Error;

/// Errors raised by the index cache
#[derive(Debug, Error)]
pub enum IndexError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Cache written by an incompatible version
    #[error("Unsupported cache version {0}")]
    UnsupportedVersion(u32),
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;
