//! Filesystem temporal log.
//!
//! On-disk layout under the root directory:
//!
//! ```text
//! log/<digest>.ndjson                 one `[timestamp, diff]` per line
//! checkpoints/<digest>/<timestamp>.json   `[versions, value]`
//! ```
//!
//! `<digest>` is [`StreamKey::digest`]. Streams are loaded lazily on first
//! touch and cached. A torn final log line (crash mid-append) is dropped and
//! the file truncated back to the last complete entry.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use arbor_types::Timestamp;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::WallClock;
use crate::diff::Diff;
use crate::error::{LedgerError, LedgerResult};
use crate::stream::{Checkpoint, CheckpointBody, LogEntry, StreamKey, StreamState};
use crate::traits::TemporalLog;
use crate::DEFAULT_CHECKPOINT_THRESHOLD;

/// Temporal log persisted as newline-delimited JSON plus checkpoint files.
pub struct FsTemporalLog {
    root: PathBuf,
    streams: Mutex<HashMap<StreamKey, StreamState>>,
    clock: WallClock,
    checkpoint_threshold: usize,
}

impl FsTemporalLog {
    /// Open (or create) a log directory with the default checkpoint threshold.
    pub fn open(root: impl Into<PathBuf>) -> LedgerResult<Self> {
        Self::open_with_threshold(root, DEFAULT_CHECKPOINT_THRESHOLD)
    }

    pub fn open_with_threshold(
        root: impl Into<PathBuf>,
        checkpoint_threshold: usize,
    ) -> LedgerResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("log"))?;
        fs::create_dir_all(root.join("checkpoints"))?;
        Ok(Self {
            root,
            streams: Mutex::new(HashMap::new()),
            clock: WallClock::new(),
            checkpoint_threshold,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn log_path(&self, digest: &str) -> PathBuf {
        self.root.join("log").join(format!("{digest}.ndjson"))
    }

    fn checkpoint_dir(&self, digest: &str) -> PathBuf {
        self.root.join("checkpoints").join(digest)
    }

    /// Run `f` against the cached state of `stream`, loading it if needed.
    fn with_state<T>(
        &self,
        stream: &StreamKey,
        f: impl FnOnce(&mut StreamState, &str) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let digest = stream.digest()?;
        let mut streams = self.streams.lock().expect("lock poisoned");
        let state = match streams.entry(stream.clone()) {
            Entry::Occupied(cached) => cached.into_mut(),
            Entry::Vacant(slot) => {
                let state = self.load(&digest)?;
                if let Some(last) = state.last_timestamp() {
                    self.clock.observe(last);
                }
                slot.insert(state)
            }
        };
        f(state, &digest)
    }

    fn load(&self, digest: &str) -> LedgerResult<StreamState> {
        let path = self.log_path(digest);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StreamState::default()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        let mut sizes = Vec::new();
        let mut good_bytes: u64 = 0;
        let mut torn = false;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.is_empty() {
                match serde_json::from_str::<LogEntry>(&line) {
                    Ok(entry) => {
                        sizes.push(line.len() + 1);
                        entries.push(entry);
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            offset = good_bytes,
                            error = %e,
                            "torn log line; truncating"
                        );
                        torn = true;
                        break;
                    }
                }
            }
            good_bytes += line.len() as u64 + 1;
        }
        if torn {
            OpenOptions::new().write(true).open(&path)?.set_len(good_bytes)?;
        }

        let checkpoints = self.load_checkpoints(digest)?;
        debug!(
            digest,
            entries = entries.len(),
            checkpoints = checkpoints.len(),
            "loaded stream"
        );
        Ok(StreamState::restore(entries, &sizes, checkpoints))
    }

    fn load_checkpoints(&self, digest: &str) -> LedgerResult<Vec<(Timestamp, CheckpointBody)>> {
        let dir = self.checkpoint_dir(digest);
        let listing = match fs::read_dir(&dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut checkpoints = Vec::new();
        for item in listing {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stamp = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| LedgerError::Corrupt {
                    path: path.clone(),
                    reason: "checkpoint name is not a timestamp".into(),
                })?;
            let body: CheckpointBody =
                serde_json::from_slice(&fs::read(&path)?).map_err(|e| LedgerError::Corrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            checkpoints.push((Timestamp::from_secs(stamp)?, body));
        }
        Ok(checkpoints)
    }

    fn append_line(&self, digest: &str, line: &[u8]) -> LedgerResult<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(digest))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(line)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn write_checkpoint(&self, digest: &str, checkpoint: &Checkpoint) -> LedgerResult<()> {
        let dir = self.checkpoint_dir(digest);
        fs::create_dir_all(&dir)?;
        let name = checkpoint.timestamp.as_secs().to_string();
        let path = dir.join(format!("{name}.json"));
        let suffix: u32 = rand::thread_rng().gen();
        let tmp = dir.join(format!(".{name}.tmp.{suffix:x}"));

        let body = CheckpointBody(checkpoint.versions.clone(), checkpoint.value.clone());
        fs::write(&tmp, serde_json::to_vec(&body)?)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl TemporalLog for FsTemporalLog {
    fn append(&self, stream: &StreamKey, diff: &Diff) -> LedgerResult<Timestamp> {
        self.with_state(stream, |state, digest| {
            let timestamp = self.clock.tick();
            let entry = LogEntry(timestamp, diff.clone());
            let line = serde_json::to_vec(&entry)?;
            self.append_line(digest, &line)?;
            state.push(entry, line.len() + 1);

            if state.needs_checkpoint(self.checkpoint_threshold) {
                let checkpoint = state.checkpoint(timestamp)?;
                self.write_checkpoint(digest, &checkpoint)?;
                info!(
                    stream = %stream,
                    at = %timestamp,
                    versions = checkpoint.versions.len(),
                    "checkpoint written"
                );
            }
            Ok(timestamp)
        })
    }

    fn read(&self, stream: &StreamKey, at: Option<Timestamp>) -> LedgerResult<Option<Value>> {
        self.with_state(stream, |state, _| state.read(at))
    }

    fn list_versions_ignoring(
        &self,
        stream: &StreamKey,
        at: Option<Timestamp>,
        ignore: &[&str],
    ) -> LedgerResult<Vec<Timestamp>> {
        self.with_state(stream, |state, _| Ok(state.versions(at, ignore)))
    }
}

impl std::fmt::Debug for FsTemporalLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsTemporalLog")
            .field("root", &self.root)
            .field("checkpoint_threshold", &self.checkpoint_threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffMode, DiffOp};
    use arbor_types::{BranchId, Key};
    use serde_json::json;

    fn stream() -> StreamKey {
        StreamKey::new(BranchId::new("R0"), Key::from(["docs", "a"]))
    }

    fn write(n: usize) -> Diff {
        vec![DiffOp::new(DiffMode::MERGE, json!({ "n": n, "pad": "y".repeat(40) }))]
    }

    #[test]
    fn log_lines_are_timestamp_diff_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let log = FsTemporalLog::open(dir.path()).unwrap();
        let t = log.append(&stream(), &write(1)).unwrap();

        let digest = stream().digest().unwrap();
        let text = fs::read_to_string(log.log_path(&digest)).unwrap();
        let line: Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(line[0].as_f64(), Some(t.as_secs()));
        assert_eq!(line[1][0][0], "u");
    }

    #[test]
    fn reopen_replays_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (t1, t2) = {
            let log = FsTemporalLog::open(dir.path()).unwrap();
            (log.append(&stream(), &write(1)).unwrap(), log.append(&stream(), &write(2)).unwrap())
        };

        let log = FsTemporalLog::open(dir.path()).unwrap();
        assert_eq!(log.read(&stream(), Some(t1)).unwrap().unwrap()["n"], 1);
        assert_eq!(log.read(&stream(), None).unwrap().unwrap()["n"], 2);
        assert_eq!(log.list_versions(&stream(), None).unwrap(), vec![t1, t2]);

        let t3 = log.append(&stream(), &write(3)).unwrap();
        assert!(t3 > t2);
    }

    #[test]
    fn checkpoints_persist_and_agree_with_replay() {
        let dir = tempfile::tempdir().unwrap();
        let stamps: Vec<Timestamp> = {
            let log = FsTemporalLog::open_with_threshold(dir.path(), 300).unwrap();
            (0..20).map(|n| log.append(&stream(), &write(n)).unwrap()).collect()
        };

        let digest = stream().digest().unwrap();
        let written = fs::read_dir(dir.path().join("checkpoints").join(&digest))
            .unwrap()
            .count();
        assert!(written > 0);

        let log = FsTemporalLog::open_with_threshold(dir.path(), 300).unwrap();
        for (n, t) in stamps.iter().enumerate() {
            assert_eq!(log.read(&stream(), Some(*t)).unwrap().unwrap()["n"], n);
        }
        assert_eq!(log.list_versions(&stream(), None).unwrap(), stamps);
    }

    #[test]
    fn torn_tail_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = FsTemporalLog::open(dir.path()).unwrap();
            log.append(&stream(), &write(1)).unwrap();
        }
        let digest = stream().digest().unwrap();
        let path = dir.path().join("log").join(format!("{digest}.ndjson"));
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"[1.0, [[\"u\"").unwrap();

        {
            let log = FsTemporalLog::open(dir.path()).unwrap();
            assert_eq!(log.read(&stream(), None).unwrap().unwrap()["n"], 1);
            log.append(&stream(), &write(2)).unwrap();
        }

        let log = FsTemporalLog::open(dir.path()).unwrap();
        assert_eq!(log.read(&stream(), None).unwrap().unwrap()["n"], 2);
        assert_eq!(log.list_versions(&stream(), None).unwrap().len(), 2);
    }
}
