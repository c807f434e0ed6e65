//! In-memory ownership registry.

use std::collections::HashMap;
use std::sync::RwLock;

use arbor_types::{BranchId, Key};

use crate::error::RefResult;
use crate::traits::OwnershipRegistry;
use crate::types::Owner;

/// An in-memory implementation of [`OwnershipRegistry`].
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: RwLock<HashMap<(BranchId, Key), Owner>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all branches, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }
}

impl OwnershipRegistry for InMemoryRegistry {
    fn get(&self, branch: &BranchId, key: &Key) -> RefResult<Option<Owner>> {
        let entries = self.entries.read().expect("lock poisoned");
        Ok(entries.get(&(branch.clone(), key.clone())).cloned())
    }

    fn set(&self, branch: &BranchId, key: &Key, owner: Owner) -> RefResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        entries.insert((branch.clone(), key.clone()), owner);
        Ok(())
    }

    fn entries(&self, branch: &BranchId) -> RefResult<Vec<(Key, Owner)>> {
        let entries = self.entries.read().expect("lock poisoned");
        let mut out: Vec<(Key, Owner)> = entries
            .iter()
            .filter(|((b, _), _)| b == branch)
            .map(|((_, key), owner)| (key.clone(), owner.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}
