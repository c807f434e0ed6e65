use std::path::PathBuf;

use arbor_types::TypeError;

/// Errors produced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown diff mode: {0:?}")]
    UnknownMode(String),

    #[error("diff mode {mode} expects {expected}, found {found}")]
    TypeMismatch {
        mode: String,
        expected: &'static str,
        found: String,
    },

    #[error("numeric overflow applying {0}")]
    Overflow(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt log file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
