//! In-process transport: a [`Peer`] that calls a [`Node`] directly.

use std::sync::{Arc, Weak};

use arbor_sync::{
    BranchInfoRequest, CallContext, CreateBranchRequest, GetReply, GetRequest, KeyQuery, Peer,
    SetAck, SetRequest, SyncError, SyncResult, UpdateRequest,
};
use arbor_types::{Branch, BranchSpec, Key, PeerId, SessionIdentity, Timestamp};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::node::Node;

/// Calls a node living in the same process, stamping each call with the
/// handle's [`CallContext`].
///
/// The handle does not keep the node alive; once the node is dropped every
/// call fails with [`SyncError::Unreachable`].
#[derive(Clone)]
pub struct LocalPeer {
    target: Weak<Node>,
    id: PeerId,
    session: SessionIdentity,
    context: CallContext,
}

impl LocalPeer {
    pub fn new(target: Weak<Node>, id: PeerId, session: SessionIdentity) -> Self {
        Self {
            target,
            id,
            session,
            context: CallContext::local(),
        }
    }

    fn node(&self) -> SyncResult<Arc<Node>> {
        self.target
            .upgrade()
            .ok_or_else(|| SyncError::Unreachable(self.id.clone()))
    }
}

#[async_trait]
impl Peer for LocalPeer {
    fn id(&self) -> &PeerId {
        &self.id
    }

    fn session(&self) -> &SessionIdentity {
        &self.session
    }

    fn with_caller(&self, context: CallContext) -> Arc<dyn Peer> {
        Arc::new(Self {
            context,
            ..self.clone()
        })
    }

    async fn set(&self, request: SetRequest) -> SyncResult<Option<SetAck>> {
        Ok(self.node()?.handle_set(&self.context, request).await?)
    }

    async fn get(&self, request: GetRequest) -> SyncResult<GetReply> {
        Ok(self.node()?.handle_get(&self.context, request).await?)
    }

    async fn remove(&self, key: Key, branch: BranchSpec) -> SyncResult<()> {
        Ok(self.node()?.handle_remove(&self.context, key, branch).await?)
    }

    async fn list(&self, query: KeyQuery) -> SyncResult<Vec<String>> {
        Ok(self.node()?.handle_list(&self.context, query).await?)
    }

    async fn list_versions(&self, query: KeyQuery) -> SyncResult<Vec<Timestamp>> {
        Ok(self.node()?.handle_list_versions(&self.context, query).await?)
    }

    async fn list_branches(&self, query: KeyQuery) -> SyncResult<Vec<String>> {
        Ok(self.node()?.handle_list_branches(&self.context, query).await?)
    }

    async fn create_branch(&self, request: CreateBranchRequest) -> SyncResult<Option<Branch>> {
        Ok(self.node()?.handle_create_branch(&self.context, request).await?)
    }

    async fn branch_info(&self, request: BranchInfoRequest) -> SyncResult<Option<Branch>> {
        Ok(self.node()?.handle_branch_info(&self.context, request).await?)
    }

    async fn update(&self, request: UpdateRequest) -> SyncResult<Map<String, Value>> {
        Ok(self.node()?.handle_update(&self.context, request).await?)
    }

    async fn add_peer(
        &self,
        peer: Arc<dyn Peer>,
        pull_branch: bool,
        branch: Option<Branch>,
        expand: bool,
    ) -> SyncResult<usize> {
        let node = self.node()?;
        Ok(node
            .handle_add_peer(&self.context, peer, pull_branch, branch, expand)
            .await?)
    }

    async fn close(&self) -> SyncResult<()> {
        Ok(self.node()?.handle_close(&self.context).await?)
    }
}
