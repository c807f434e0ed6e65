//! Ownership registry for arbor.
//!
//! Subtrees of every branch are sharded across peers. The registry is a
//! node's sparse, local view of that sharding: a map from `(branch, key)` to
//! the peer that answers for the subtree at `key`. Lookups inherit: a key
//! without an entry belongs to the owner of its nearest registered ancestor.
//!
//! # Architecture
//!
//! - Entries are written by the tree store as it learns who answered for
//!   what. The registry does not check consistency between ancestors and
//!   descendants.
//! - An entry may be cleared to [`Owner::Unknown`] when the cached peer turns
//!   out to be gone. Resolution then skips it and keeps walking upward.
//!
//! # Modules
//!
//! - [`error`] — Error types for registry operations
//! - [`types`] — [`Owner`] and [`Resolution`]
//! - [`traits`] — The [`OwnershipRegistry`] trait
//! - [`names`] — Branch name validation
//! - [`memory`] — [`InMemoryRegistry`]
//! - [`fs`] — [`FsRegistry`], an append-only journal over the in-memory map

pub mod error;
pub mod fs;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, RefResult};
pub use fs::FsRegistry;
pub use memory::InMemoryRegistry;
pub use names::validate_branch_name;
pub use traits::OwnershipRegistry;
pub use types::{Owner, Resolution};
