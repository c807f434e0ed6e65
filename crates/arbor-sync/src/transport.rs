use std::sync::Arc;

use arbor_types::{Branch, BranchSpec, Key, PeerId, SessionIdentity, Timestamp};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::SyncResult;
use crate::types::{
    BranchInfoRequest, CallContext, CreateBranchRequest, GetReply, GetRequest, KeyQuery, SetAck,
    SetRequest, UpdateRequest,
};

/// A handle to another node.
///
/// Every call is made as the identity the handle was stamped with (see
/// [`Peer::with_caller`]); the remote node decides from that identity
/// whether the call comes from a peer or from an external client.
#[async_trait]
pub trait Peer: Send + Sync {
    /// Node id of the remote.
    fn id(&self) -> &PeerId;

    /// Session the remote node runs under.
    fn session(&self) -> &SessionIdentity;

    /// The same remote, called as `context`.
    fn with_caller(&self, context: CallContext) -> Arc<dyn Peer>;

    /// Returns `None` if no owner could be found for any prefix of the key.
    async fn set(&self, request: SetRequest) -> SyncResult<Option<SetAck>>;

    async fn get(&self, request: GetRequest) -> SyncResult<GetReply>;

    async fn remove(&self, key: Key, branch: BranchSpec) -> SyncResult<()>;

    /// Child segments of a key.
    async fn list(&self, query: KeyQuery) -> SyncResult<Vec<String>>;

    async fn list_versions(&self, query: KeyQuery) -> SyncResult<Vec<Timestamp>>;

    /// Names of the branches forked at a key.
    async fn list_branches(&self, query: KeyQuery) -> SyncResult<Vec<String>>;

    async fn create_branch(&self, request: CreateBranchRequest) -> SyncResult<Option<Branch>>;

    async fn branch_info(&self, request: BranchInfoRequest) -> SyncResult<Option<Branch>>;

    /// Returns the metadata after the update.
    async fn update(&self, request: UpdateRequest) -> SyncResult<Map<String, Value>>;

    /// Introduce `peer` to the remote. Returns the remote's member count.
    async fn add_peer(
        &self,
        peer: Arc<dyn Peer>,
        pull_branch: bool,
        branch: Option<Branch>,
        expand: bool,
    ) -> SyncResult<usize>;

    /// Deregister the caller from the remote.
    async fn close(&self) -> SyncResult<()>;
}
