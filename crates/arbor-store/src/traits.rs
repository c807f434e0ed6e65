use arbor_types::ContentHash;

use crate::error::{StoreError, StoreResult};
use crate::object::EncodedValue;

/// Content-addressed blob store.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written; the same bytes always produce the
///   same hash.
/// - Writes are create-if-absent and idempotent.
/// - Readers never observe a partially written blob.
pub trait BlobStore: Send + Sync {
    /// Read the bytes stored under `hash`.
    ///
    /// Returns `Ok(None)` if the blob does not exist.
    fn read(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>>;

    /// Store an encoded value and return its content hash.
    fn write(&self, value: &EncodedValue) -> StoreResult<ContentHash>;

    /// Check whether a blob exists.
    fn exists(&self, hash: &ContentHash) -> StoreResult<bool>;

    /// Store bytes that were fetched for a known hash, verifying them first.
    fn write_verified(&self, hash: &ContentHash, data: Vec<u8>) -> StoreResult<()> {
        let encoded = EncodedValue::new(hash.kind()?, data);
        let computed = encoded.compute_hash();
        if computed != *hash {
            return Err(StoreError::HashMismatch {
                expected: hash.clone(),
                computed,
            });
        }
        self.write(&encoded)?;
        Ok(())
    }

    /// Read a blob and pair it with the kind its hash names.
    fn read_encoded(&self, hash: &ContentHash) -> StoreResult<Option<EncodedValue>> {
        let kind = hash.kind()?;
        Ok(self.read(hash)?.map(|data| EncodedValue::new(kind, data)))
    }
}
