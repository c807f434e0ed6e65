//! Content-addressed blob storage for arbor.
//!
//! Every value written to a key is encoded to bytes, hashed, and stored as
//! an immutable blob under its [`ContentHash`](arbor_types::ContentHash). The
//! hash carries a one-character kind tag so a reader knows how to decode the
//! bytes without consulting anything else.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsBlobStore`] -- one file per blob, written via temp file + rename
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written (content-addressing guarantees this).
//! 2. Writes are create-if-absent; writing the same bytes twice is a no-op.
//! 3. Concurrent reads are always safe.
//! 4. There is no delete path; retention is out of scope.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsBlobStore;
pub use memory::InMemoryBlobStore;
pub use object::EncodedValue;
pub use traits::BlobStore;
