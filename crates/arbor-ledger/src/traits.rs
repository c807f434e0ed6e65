use arbor_types::Timestamp;
use serde_json::Value;

use crate::diff::Diff;
use crate::error::LedgerResult;
use crate::stream::StreamKey;

/// Append-only, per-key temporal log.
///
/// Timestamps handed out by `append` are strictly increasing per stream.
/// A `None` timestamp on reads means "latest".
pub trait TemporalLog: Send + Sync {
    /// Append a diff, returning the version stamp it was recorded under.
    fn append(&self, stream: &StreamKey, diff: &Diff) -> LedgerResult<Timestamp>;

    /// Replay the stream up to `at`. `None` if nothing was written by then.
    fn read(&self, stream: &StreamKey, at: Option<Timestamp>) -> LedgerResult<Option<Value>>;

    /// Version stamps up to `at`, leaving out entries that only merge the
    /// given top-level fields.
    fn list_versions_ignoring(
        &self,
        stream: &StreamKey,
        at: Option<Timestamp>,
        ignore: &[&str],
    ) -> LedgerResult<Vec<Timestamp>>;

    /// Version stamps up to `at`, oldest first.
    fn list_versions(
        &self,
        stream: &StreamKey,
        at: Option<Timestamp>,
    ) -> LedgerResult<Vec<Timestamp>> {
        self.list_versions_ignoring(stream, at, &[])
    }

    /// Newest version stamp up to `at`.
    fn latest_version(
        &self,
        stream: &StreamKey,
        at: Option<Timestamp>,
    ) -> LedgerResult<Option<Timestamp>> {
        Ok(self.list_versions(stream, at)?.last().copied())
    }
}
