//! Foundation types for arbor, a distributed, hierarchical, versioned
//! key-value store.
//!
//! Every other arbor crate depends on `arbor-types`.
//!
//! # Key Types
//!
//! - [`Key`] — Path-like sequence of segments addressing a node in the tree
//! - [`Timestamp`] — Wall-clock version token (seconds since UNIX epoch)
//! - [`PeerId`] / [`BranchId`] — Node and branch identifiers
//! - [`SessionIdentity`] — Authenticated caller identity supplied by the transport
//! - [`Branch`] / [`BranchSpec`] — Branch records and the ways callers name them
//! - [`ContentHash`] — Type-tagged content address of a stored value
//! - [`StoredValue`] — The three value shapes a key can hold

pub mod branch;
pub mod error;
pub mod identity;
pub mod key;
pub mod object;
pub mod temporal;

pub use branch::{Branch, BranchSpec};
pub use error::TypeError;
pub use identity::{BranchId, PeerId, SessionIdentity};
pub use key::Key;
pub use object::{ContentHash, StoredValue, ValueKind, OBJECT_HASH_LEN};
pub use temporal::Timestamp;
