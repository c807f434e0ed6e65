//! High-level SDK for arbor.
//!
//! A [`Node`] is one member of a deployment. It stores the subtrees it owns
//! (blobs, temporal logs, and an ownership registry) and answers for every
//! other key by delegating to the owning peer. Applications work through a
//! [`BranchHandle`], obtained from [`Node::store`] or [`Node::branch`].

pub mod branch;
mod branching;
pub mod config;
pub mod directory;
pub mod error;
pub mod local;
pub mod locks;
pub mod node;
mod store;

pub use branch::{BranchHandle, SetOptions};
pub use config::NodeConfig;
pub use directory::PeerDirectory;
pub use error::{SdkError, SdkResult};
pub use local::LocalPeer;
pub use node::Node;

// Re-export key types
pub use arbor_sync::{CallContext, Peer, SyncError};
pub use arbor_types::{
    Branch, BranchId, BranchSpec, Key, PeerId, SessionIdentity, StoredValue, Timestamp,
};
