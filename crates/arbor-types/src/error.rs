use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid content hash: {0}")]
    InvalidHash(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("value kind mismatch: expected {expected}, got {actual}")]
    KindMismatch { expected: String, actual: String },
}
