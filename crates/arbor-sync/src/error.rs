use arbor_types::{ContentHash, Key, PeerId};
use thiserror::Error;

/// Failure of a call made on a peer.
///
/// Domain errors raised by the remote node travel back as their own variants
/// so the caller can surface them unchanged.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("peer {0} is unreachable")]
    Unreachable(PeerId),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("condition not fulfilled: {0}")]
    ConditionNotFulfilled(String),

    #[error("key {0} is not owned by the called node")]
    NotOwned(Key),

    #[error("fetching blob {hash} failed: {reason}")]
    BlobFetch { hash: ContentHash, reason: String },

    #[error("remote error: {0}")]
    Remote(String),
}

impl SyncError {
    /// Returns `true` if the peer reference is stale and the caller should
    /// re-resolve ownership instead of failing.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
