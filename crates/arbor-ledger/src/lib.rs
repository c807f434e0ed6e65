//! Per-key temporal logs for arbor.
//!
//! This crate answers "what was key K on branch B at time T". It provides:
//! - The diff language (`DiffMode`, `DiffOp`) and its pure replay function
//! - `TemporalLog` trait boundary with in-memory and filesystem backends
//! - Size-triggered checkpoints that bound replay cost
//! - `KeyRecord`, the typed view of a replayed key
//! - `WallClock`, a strictly increasing wall-clock source for log stamps

pub mod clock;
pub mod diff;
pub mod error;
pub mod fs;
pub mod memory;
pub mod record;
pub mod stream;
pub mod traits;

pub use clock::WallClock;
pub use diff::{apply, apply_diff, Diff, DiffMode, DiffOp, Leaf};
pub use error::{LedgerError, LedgerResult};
pub use fs::FsTemporalLog;
pub use memory::InMemoryTemporalLog;
pub use record::KeyRecord;
pub use stream::StreamKey;
pub use traits::TemporalLog;

/// Default size (in serialized log bytes) after which a checkpoint is written.
pub const DEFAULT_CHECKPOINT_THRESHOLD: usize = 1_000_000;
