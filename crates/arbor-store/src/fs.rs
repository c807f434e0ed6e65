//! Filesystem blob store: one file per blob, named by its hash.
//!
//! Hash strings are URL-safe base64, so they are valid file names as-is.
//! Writes go to a uniquely named temporary file in the same directory and
//! are renamed into place, so readers see either nothing or the whole blob.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use arbor_types::ContentHash;
use rand::Rng;
use tracing::debug;

use crate::error::StoreResult;
use crate::object::EncodedValue;
use crate::traits::BlobStore;

/// Blob store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (creating if needed) a blob directory.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.as_str())
    }

    fn temp_path(&self, hash: &ContentHash) -> PathBuf {
        let suffix: u64 = rand::thread_rng().gen();
        self.root
            .join(format!(".{}.tmp.{}.{suffix:x}", hash.as_str(), std::process::id()))
    }
}

impl BlobStore for FsBlobStore {
    fn read(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(hash)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, value: &EncodedValue) -> StoreResult<ContentHash> {
        let hash = value.compute_hash();
        let path = self.path_for(&hash);
        if path.exists() {
            return Ok(hash);
        }

        let tmp = self.temp_path(&hash);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&value.data)?;
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(hash = %hash, bytes = value.size(), "wrote blob");
        Ok(hash)
    }

    fn exists(&self, hash: &ContentHash) -> StoreResult<bool> {
        Ok(self.path_for(hash).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::StoredValue;
    use serde_json::json;

    #[test]
    fn write_then_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("data")).unwrap();
        let value = EncodedValue::encode(&StoredValue::from(json!({"a": [1, 2]}))).unwrap();
        let hash = store.write(&value).unwrap();

        assert!(store.exists(&hash).unwrap());
        assert!(store.root().join(hash.as_str()).is_file());
        let read = store.read_encoded(&hash).unwrap().unwrap();
        assert_eq!(read.decode().unwrap(), StoredValue::from(json!({"a": [1, 2]})));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let hash = {
            let store = FsBlobStore::open(dir.path()).unwrap();
            store.write(&EncodedValue::encode(&StoredValue::from("kept")).unwrap()).unwrap()
        };
        let store = FsBlobStore::open(dir.path()).unwrap();
        assert_eq!(store.read(&hash).unwrap().unwrap(), b"kept");
    }

    #[test]
    fn missing_blob_is_none_and_no_temp_files_remain() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        store.write(&EncodedValue::encode(&StoredValue::from(vec![1u8, 2, 3])).unwrap()).unwrap();
        let missing = EncodedValue::encode(&StoredValue::from("nope")).unwrap().compute_hash();
        assert!(store.read(&missing).unwrap().is_none());

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].contains(".tmp."));
    }
}
