//! The [`OwnershipRegistry`] trait.

use arbor_types::{BranchId, Key};

use crate::error::RefResult;
use crate::types::{Owner, Resolution};

/// Sparse `(branch, key) -> owner` map with ancestor-inheriting lookup.
///
/// Implementations must be thread-safe. Each node owns its own instance.
pub trait OwnershipRegistry: Send + Sync {
    /// The entry registered for exactly this key, if any.
    fn get(&self, branch: &BranchId, key: &Key) -> RefResult<Option<Owner>>;

    /// Register `owner` for the subtree at `key`.
    fn set(&self, branch: &BranchId, key: &Key, owner: Owner) -> RefResult<()>;

    /// All entries of a branch, sorted by key.
    fn entries(&self, branch: &BranchId) -> RefResult<Vec<(Key, Owner)>>;

    /// Mark the entry at `key` as stale.
    fn clear(&self, branch: &BranchId, key: &Key) -> RefResult<()> {
        self.set(branch, key, Owner::Unknown)
    }

    /// Walk from `key` up to the root and return the first known owner.
    ///
    /// [`Owner::Unknown`] entries are skipped.
    fn resolve(&self, branch: &BranchId, key: &Key) -> RefResult<Option<Resolution>> {
        for (_, prefix) in key.ancestors() {
            if let Some(Owner::Peer(owner)) = self.get(branch, &prefix)? {
                return Ok(Some(Resolution {
                    owner,
                    prefix_len: prefix.len(),
                }));
            }
        }
        Ok(None)
    }
}
