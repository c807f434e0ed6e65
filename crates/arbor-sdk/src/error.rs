use std::time::Duration;

use arbor_sync::SyncError;
use arbor_types::Key;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("condition not fulfilled: {0}")]
    ConditionNotFulfilled(String),

    #[error("key {key} is not owned by this node")]
    NotOwned { key: Key },

    #[error("update timed out after {0:?}")]
    Timeout(Duration),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] arbor_store::StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] arbor_ledger::LedgerError),

    #[error("ref error: {0}")]
    Ref(#[from] arbor_refs::RefError),

    #[error("expression error: {0}")]
    Gate(#[from] arbor_gate::GateError),

    #[error("type error: {0}")]
    Type(#[from] arbor_types::TypeError),

    #[error("peer error: {0}")]
    Sync(SyncError),
}

/// Domain errors raised on a remote node come back as themselves.
impl From<SyncError> for SdkError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Permission(reason) => Self::Permission(reason),
            SyncError::ConditionNotFulfilled(condition) => Self::ConditionNotFulfilled(condition),
            SyncError::NotOwned(key) => Self::NotOwned { key },
            other => Self::Sync(other),
        }
    }
}

/// How a node's error is reported to the peer that called it.
impl From<SdkError> for SyncError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::Permission(reason) => Self::Permission(reason),
            SdkError::ConditionNotFulfilled(condition) => Self::ConditionNotFulfilled(condition),
            SdkError::NotOwned { key } => Self::NotOwned(key),
            SdkError::Sync(inner) => inner,
            other => Self::Remote(other.to_string()),
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
