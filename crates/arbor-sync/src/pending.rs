//! Deferred transfer of large values.
//!
//! Instead of shipping a large blob with every delegated call, the sender
//! passes its hash and a [`BlobSource`]. The receiver checks its own blob
//! store first and fetches the bytes only when it has to.

use std::fmt;
use std::sync::Arc;

use arbor_types::ContentHash;
use async_trait::async_trait;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Something that can produce the encoded bytes of a blob on request.
#[async_trait]
pub trait BlobSource: Send + Sync {
    async fn fetch(&self, hash: &ContentHash) -> SyncResult<Vec<u8>>;
}

/// A blob named by hash whose bytes have not been transferred yet.
#[derive(Clone)]
pub struct Pending {
    pub hash: ContentHash,
    pub source: Arc<dyn BlobSource>,
}

impl Pending {
    pub fn new(hash: ContentHash, source: Arc<dyn BlobSource>) -> Self {
        Self { hash, source }
    }

    /// Hold `bytes` in memory and hand them out on request.
    pub fn buffered(hash: ContentHash, bytes: Vec<u8>) -> Self {
        let source = Arc::new(BufferedSource::new(hash.clone(), bytes));
        Self { hash, source }
    }

    pub async fn fetch(&self) -> SyncResult<Vec<u8>> {
        self.source.fetch(&self.hash).await
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pending({})", self.hash)
    }
}

/// A [`BlobSource`] serving one blob from memory.
pub struct BufferedSource {
    hash: ContentHash,
    bytes: Vec<u8>,
}

impl BufferedSource {
    pub fn new(hash: ContentHash, bytes: Vec<u8>) -> Self {
        Self { hash, bytes }
    }
}

#[async_trait]
impl BlobSource for BufferedSource {
    async fn fetch(&self, hash: &ContentHash) -> SyncResult<Vec<u8>> {
        if *hash != self.hash {
            return Err(SyncError::BlobFetch {
                hash: hash.clone(),
                reason: format!("source only holds {}", self.hash),
            });
        }
        debug!(hash = %hash, bytes = self.bytes.len(), "serving buffered blob");
        Ok(self.bytes.clone())
    }
}
