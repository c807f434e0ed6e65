use std::fmt;

use arbor_crypto::ContentHasher;
use arbor_types::{BranchId, Key, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::{apply_diff, Diff, DiffMode, Leaf};
use crate::error::{LedgerError, LedgerResult};

/// Identifies one temporal log: a key on a branch.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub branch: BranchId,
    pub key: Key,
}

impl StreamKey {
    pub fn new(branch: BranchId, key: Key) -> Self {
        Self { branch, key }
    }

    /// Stable file-name-safe digest of `[branch, ...segments]`.
    pub fn digest(&self) -> LedgerResult<String> {
        let mut parts = Vec::with_capacity(self.key.len() + 1);
        parts.push(self.branch.as_str());
        parts.extend(self.key.segments().iter().map(String::as_str));
        ContentHasher::digest_json(&parts).map_err(|e| LedgerError::Serialization(e.to_string()))
    }
}

impl fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamKey({}:{})", self.branch, self.key)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.branch, self.key)
    }
}

/// A single appended diff, serialized as `[timestamp, diff]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry(pub Timestamp, pub Diff);

/// Materialized state as of `timestamp`, covering the first `offset` entries.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub timestamp: Timestamp,
    pub offset: usize,
    pub versions: Vec<Timestamp>,
    pub value: Option<Value>,
}

/// Checkpoint payload as stored: `[versions, value]`.
#[derive(Serialize, Deserialize)]
pub(crate) struct CheckpointBody(pub Vec<Timestamp>, pub Option<Value>);

/// In-memory state of one stream, shared by every backend.
#[derive(Clone, Debug, Default)]
pub struct StreamState {
    entries: Vec<LogEntry>,
    checkpoints: Vec<Checkpoint>,
    /// Serialized size of entries since the newest checkpoint.
    tail_bytes: usize,
}

impl StreamState {
    /// Rebuild from persisted entries and checkpoints (in any order).
    pub(crate) fn restore(
        entries: Vec<LogEntry>,
        entry_sizes: &[usize],
        mut checkpoints: Vec<(Timestamp, CheckpointBody)>,
    ) -> Self {
        checkpoints.sort_by_key(|(ts, _)| *ts);
        let checkpoints: Vec<Checkpoint> = checkpoints
            .into_iter()
            .map(|(timestamp, CheckpointBody(versions, value))| Checkpoint {
                timestamp,
                offset: entries.partition_point(|e| e.0 <= timestamp),
                versions,
                value,
            })
            .collect();
        let since = checkpoints.last().map_or(0, |c| c.offset);
        let tail_bytes = entry_sizes.iter().skip(since).sum();
        Self {
            entries,
            checkpoints,
            tail_bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.entries.last().map(|e| e.0)
    }

    /// Record an appended entry of `size` serialized bytes.
    pub fn push(&mut self, entry: LogEntry, size: usize) {
        self.entries.push(entry);
        self.tail_bytes += size;
    }

    pub fn needs_checkpoint(&self, threshold: usize) -> bool {
        self.tail_bytes > threshold
    }

    /// Materialize the current state as a checkpoint at `timestamp`.
    pub fn checkpoint(&mut self, timestamp: Timestamp) -> LedgerResult<Checkpoint> {
        let checkpoint = Checkpoint {
            timestamp,
            offset: self.entries.len(),
            versions: self.versions(None, &[]),
            value: self.read(None)?,
        };
        self.checkpoints.push(checkpoint.clone());
        self.tail_bytes = 0;
        Ok(checkpoint)
    }

    fn base(&self, at: Option<Timestamp>) -> Option<&Checkpoint> {
        let upto = match at {
            None => self.checkpoints.len(),
            Some(at) => self.checkpoints.partition_point(|c| c.timestamp <= at),
        };
        upto.checked_sub(1).map(|i| &self.checkpoints[i])
    }

    /// Entries after `base`, up to and including `at`.
    fn tail(
        &self,
        base: Option<&Checkpoint>,
        at: Option<Timestamp>,
    ) -> impl Iterator<Item = &LogEntry> {
        let offset = base.map_or(0, |c| c.offset);
        self.entries[offset..]
            .iter()
            .take_while(move |e| at.map_or(true, |at| e.0 <= at))
    }

    /// Replay to the value as of `at` (latest when `None`).
    pub fn read(&self, at: Option<Timestamp>) -> LedgerResult<Option<Value>> {
        let base = self.base(at);
        let mut value = base.and_then(|c| c.value.clone());
        for entry in self.tail(base, at) {
            value = apply_diff(value, &entry.1)?;
        }
        Ok(value)
    }

    /// Version stamps up to `at`, skipping entries that only touch `ignore`d
    /// top-level fields.
    pub fn versions(&self, at: Option<Timestamp>, ignore: &[&str]) -> Vec<Timestamp> {
        let base = self.base(at);
        let mut versions = base.map(|c| c.versions.clone()).unwrap_or_default();
        versions.extend(
            self.tail(base, at)
                .filter(|e| !only_touches(&e.1, ignore))
                .map(|e| e.0),
        );
        versions
    }
}

/// Returns `true` if every op merges only fields named in `ignore`.
fn only_touches(diff: &Diff, ignore: &[&str]) -> bool {
    !ignore.is_empty()
        && diff.iter().all(|op| {
            let mode: DiffMode = op.mode();
            let merges_fields = mode.depth() > 0 || mode.leaf() == Leaf::Merge;
            merges_fields
                && op
                    .payload()
                    .as_object()
                    .is_some_and(|fields| fields.keys().all(|k| ignore.contains(&k.as_str())))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffOp;
    use serde_json::json;

    fn ts(secs: f64) -> Timestamp {
        Timestamp::from_secs(secs).unwrap()
    }

    fn set(n: i64) -> Diff {
        vec![DiffOp::new(DiffMode::MERGE, json!({ "n": n }))]
    }

    fn state_with(points: &[(f64, i64)]) -> StreamState {
        let mut state = StreamState::default();
        for (secs, n) in points {
            state.push(LogEntry(ts(*secs), set(*n)), 10);
        }
        state
    }

    #[test]
    fn reads_are_point_in_time() {
        let state = state_with(&[(1.0, 1), (2.0, 2), (3.0, 3)]);
        assert_eq!(state.read(Some(ts(0.5))).unwrap(), None);
        assert_eq!(state.read(Some(ts(2.0))).unwrap(), Some(json!({"n": 2})));
        assert_eq!(state.read(Some(ts(2.5))).unwrap(), Some(json!({"n": 2})));
        assert_eq!(state.read(None).unwrap(), Some(json!({"n": 3})));
    }

    #[test]
    fn checkpoint_preserves_history() {
        let mut state = state_with(&[(1.0, 1), (2.0, 2)]);
        let cp = state.checkpoint(ts(2.0)).unwrap();
        assert_eq!(cp.versions, vec![ts(1.0), ts(2.0)]);
        assert!(!state.needs_checkpoint(0));

        state.push(LogEntry(ts(3.0), set(3)), 10);
        assert_eq!(state.read(Some(ts(1.5))).unwrap(), Some(json!({"n": 1})));
        assert_eq!(state.read(Some(ts(2.5))).unwrap(), Some(json!({"n": 2})));
        assert_eq!(state.read(None).unwrap(), Some(json!({"n": 3})));
        assert_eq!(state.versions(None, &[]), vec![ts(1.0), ts(2.0), ts(3.0)]);
        assert_eq!(state.versions(Some(ts(1.0)), &[]), vec![ts(1.0)]);
    }

    #[test]
    fn restore_recomputes_offsets() {
        let mut live = state_with(&[(1.0, 1), (2.0, 2)]);
        let cp = live.checkpoint(ts(2.0)).unwrap();
        live.push(LogEntry(ts(3.0), set(3)), 10);

        let entries = vec![
            LogEntry(ts(1.0), set(1)),
            LogEntry(ts(2.0), set(2)),
            LogEntry(ts(3.0), set(3)),
        ];
        let restored = StreamState::restore(
            entries,
            &[10, 10, 10],
            vec![(cp.timestamp, CheckpointBody(cp.versions.clone(), cp.value.clone()))],
        );
        assert_eq!(restored.read(None).unwrap(), live.read(None).unwrap());
        assert_eq!(restored.versions(None, &[]), live.versions(None, &[]));
        assert!(restored.needs_checkpoint(9));
        assert!(!restored.needs_checkpoint(10));
    }

    #[test]
    fn ignored_fields_hide_versions() {
        let mut state = StreamState::default();
        state.push(
            LogEntry(ts(1.0), vec![DiffOp::new(DiffMode::MERGE, json!({"origin": {}}))]),
            10,
        );
        assert_eq!(state.versions(None, &["origin"]), Vec::<Timestamp>::new());
        state.push(LogEntry(ts(2.0), set(1)), 10);
        assert_eq!(state.versions(None, &["origin"]), vec![ts(2.0)]);
        assert_eq!(state.versions(None, &[]).len(), 2);
    }

    #[test]
    fn digest_depends_on_branch_and_key() {
        let a = StreamKey::new(BranchId::new("b"), Key::from(["x"]));
        let b = StreamKey::new(BranchId::new("c"), Key::from(["x"]));
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap(), a.clone().digest().unwrap());
    }
}
