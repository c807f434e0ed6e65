use std::collections::HashMap;
use std::sync::RwLock;

use arbor_types::Timestamp;
use serde_json::Value;
use tracing::debug;

use crate::clock::WallClock;
use crate::diff::Diff;
use crate::error::LedgerResult;
use crate::stream::{LogEntry, StreamKey, StreamState};
use crate::traits::TemporalLog;
use crate::DEFAULT_CHECKPOINT_THRESHOLD;

/// In-memory temporal log for tests and embedding.
///
/// Entry sizes are measured as their JSON encoding so checkpoints trigger at
/// the same points a persisted log would.
pub struct InMemoryTemporalLog {
    streams: RwLock<HashMap<StreamKey, StreamState>>,
    clock: WallClock,
    checkpoint_threshold: usize,
}

impl InMemoryTemporalLog {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_CHECKPOINT_THRESHOLD)
    }

    pub fn with_threshold(checkpoint_threshold: usize) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            clock: WallClock::new(),
            checkpoint_threshold,
        }
    }

    /// Number of streams with at least one entry.
    pub fn stream_count(&self) -> usize {
        self.streams.read().expect("lock poisoned").len()
    }
}

impl Default for InMemoryTemporalLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalLog for InMemoryTemporalLog {
    fn append(&self, stream: &StreamKey, diff: &Diff) -> LedgerResult<Timestamp> {
        let mut streams = self.streams.write().expect("lock poisoned");
        let state = streams.entry(stream.clone()).or_default();
        let timestamp = self.clock.tick();
        let entry = LogEntry(timestamp, diff.clone());
        let size = serde_json::to_vec(&entry)?.len() + 1;
        state.push(entry, size);

        if state.needs_checkpoint(self.checkpoint_threshold) {
            let checkpoint = state.checkpoint(timestamp)?;
            debug!(
                stream = %stream,
                at = %timestamp,
                versions = checkpoint.versions.len(),
                "checkpoint"
            );
        }
        Ok(timestamp)
    }

    fn read(&self, stream: &StreamKey, at: Option<Timestamp>) -> LedgerResult<Option<Value>> {
        let streams = self.streams.read().expect("lock poisoned");
        match streams.get(stream) {
            Some(state) => state.read(at),
            None => Ok(None),
        }
    }

    fn list_versions_ignoring(
        &self,
        stream: &StreamKey,
        at: Option<Timestamp>,
        ignore: &[&str],
    ) -> LedgerResult<Vec<Timestamp>> {
        let streams = self.streams.read().expect("lock poisoned");
        Ok(streams
            .get(stream)
            .map(|state| state.versions(at, ignore))
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for InMemoryTemporalLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTemporalLog")
            .field("streams", &self.stream_count())
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

    fn stream(path: &[&str]) -> StreamKey {
        StreamKey::new(BranchId::new("R0"), Key::from(path))
    }

    fn write(n: usize) -> Diff {
        vec![DiffOp::new(DiffMode::MERGE, json!({ "n": n, "pad": "x".repeat(64) }))]
    }

    // ---- Point-in-time reads ----

    #[test]
    fn version_tokens_select_past_values() {
        let log = InMemoryTemporalLog::new();
        let s = stream(&["x"]);
        let t1 = log.append(&s, &write(1)).unwrap();
        let t2 = log.append(&s, &write(2)).unwrap();
        assert!(t2 > t1);

        assert_eq!(log.read(&s, Some(t1)).unwrap().unwrap()["n"], 1);
        assert_eq!(log.read(&s, None).unwrap().unwrap()["n"], 2);
        assert_eq!(log.list_versions(&s, None).unwrap(), vec![t1, t2]);
        assert_eq!(log.latest_version(&s, Some(t1)).unwrap(), Some(t1));
    }

    #[test]
    fn unknown_stream_is_empty() {
        let log = InMemoryTemporalLog::new();
        assert!(log.read(&stream(&["nope"]), None).unwrap().is_none());
        assert!(log.list_versions(&stream(&["nope"]), None).unwrap().is_empty());
    }

    #[test]
    fn streams_are_independent() {
        let log = InMemoryTemporalLog::new();
        log.append(&stream(&["a"]), &write(1)).unwrap();
        log.append(&stream(&["b"]), &write(2)).unwrap();
        assert_eq!(log.read(&stream(&["a"]), None).unwrap().unwrap()["n"], 1);
        assert_eq!(log.stream_count(), 2);
    }

    // ---- Checkpoints ----

    #[test]
    fn checkpoints_do_not_change_answers() {
        let small = InMemoryTemporalLog::with_threshold(200);
        let s = stream(&["k"]);
        let stamps: Vec<Timestamp> = (0..50)
            .map(|n| small.append(&s, &write(n)).unwrap())
            .collect();

        for (n, t) in stamps.iter().enumerate() {
            assert_eq!(small.read(&s, Some(*t)).unwrap().unwrap()["n"], n);
            assert_eq!(small.list_versions(&s, Some(*t)).unwrap(), stamps[..=n].to_vec());
        }
        assert_eq!(small.read(&s, None).unwrap().unwrap()["n"], 49);
    }
}
