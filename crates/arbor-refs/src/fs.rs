//! Persisted ownership registry.
//!
//! Every `set` is appended to `registry.ndjson` as `[branch, key, owner]`;
//! opening the registry replays the journal into an [`InMemoryRegistry`].
//! Later lines win.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use arbor_types::{BranchId, Key};
use tracing::{debug, warn};

use crate::error::{RefError, RefResult};
use crate::memory::InMemoryRegistry;
use crate::traits::OwnershipRegistry;
use crate::types::Owner;

const JOURNAL: &str = "registry.ndjson";

/// Registry journaled to a directory.
#[derive(Debug)]
pub struct FsRegistry {
    path: PathBuf,
    cache: InMemoryRegistry,
    writer: Mutex<()>,
}

impl FsRegistry {
    /// Open (or create) the registry under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> RefResult<Self> {
        fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(JOURNAL);
        let cache = InMemoryRegistry::new();

        match File::open(&path) {
            Ok(file) => {
                let mut replayed = 0usize;
                for line in BufReader::new(file).lines() {
                    let line = line?;
                    match serde_json::from_str::<(BranchId, Key, Owner)>(&line) {
                        Ok((branch, key, owner)) => {
                            cache.set(&branch, &key, owner)?;
                            replayed += 1;
                        }
                        Err(e) => {
                            warn!(
                                path = %path.display(),
                                error = %e,
                                "skipping unreadable registry line"
                            );
                        }
                    }
                }
                debug!(replayed, "registry journal loaded");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path,
            cache,
            writer: Mutex::new(()),
        })
    }
}

impl OwnershipRegistry for FsRegistry {
    fn get(&self, branch: &BranchId, key: &Key) -> RefResult<Option<Owner>> {
        self.cache.get(branch, key)
    }

    fn set(&self, branch: &BranchId, key: &Key, owner: Owner) -> RefResult<()> {
        let mut line = serde_json::to_vec(&(branch, key, &owner))
            .map_err(|e| RefError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let _guard = self.writer.lock().expect("lock poisoned");
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&line)?;
        writer.flush()?;
        self.cache.set(branch, key, owner)
    }

    fn entries(&self, branch: &BranchId) -> RefResult<Vec<(Key, Owner)>> {
        self.cache.entries(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::PeerId;

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let branch = BranchId::new("R0");
        {
            let reg = FsRegistry::open(dir.path()).unwrap();
            reg.set(&branch, &Key::root(), Owner::Peer(PeerId::new("A"))).unwrap();
            reg.set(&branch, &Key::from(["x"]), Owner::Peer(PeerId::new("B"))).unwrap();
            reg.clear(&branch, &Key::from(["x"])).unwrap();
        }

        let reg = FsRegistry::open(dir.path()).unwrap();
        assert_eq!(reg.get(&branch, &Key::from(["x"])).unwrap(), Some(Owner::Unknown));
        let res = reg.resolve(&branch, &Key::from(["x", "y"])).unwrap().unwrap();
        assert_eq!(res.owner, PeerId::new("A"));
    }
}
