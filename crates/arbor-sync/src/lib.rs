//! Peer-to-peer calls for arbor.
//!
//! A node answers for any key by delegating to the peer that owns it. This
//! crate defines what such a delegation looks like, independent of how the
//! bytes travel:
//!
//! - [`Peer`] -- the calls a node accepts from other nodes
//! - [`CallContext`] -- the authenticated caller of a call
//! - [`SetRequest`] / [`SetAck`], [`GetRequest`] / [`GetReply`], ... -- wire types
//! - [`Pending`] -- a large value sent by hash, fetched only if needed
//!
//! The transport authenticates callers; nodes only compare the identities it
//! vouches for.

pub mod error;
pub mod pending;
pub mod transport;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use pending::{BlobSource, BufferedSource, Pending};
pub use transport::Peer;
pub use types::{
    BranchInfoRequest, CallContext, CreateBranchRequest, GetReply, GetRequest, KeyQuery, SetAck,
    SetRequest, UpdateRequest, ValuePayload,
};
