//! Content hashing for arbor.
//!
//! Blobs, log streams, and checkpoints are all addressed by a BLAKE3 digest
//! rendered as unpadded url-safe base64 (43 characters), so hashes double as
//! file names.

pub mod hasher;

pub use hasher::{ContentHasher, HasherError};
