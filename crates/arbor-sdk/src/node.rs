//! A node: identity, storage, peers, and branches.
//!
//! The tree store protocol lives in [`crate::store`] and branch management in
//! [`crate::branching`]; both are further `impl Node` blocks.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use arbor_ledger::record::ORIGIN_FIELD;
use arbor_ledger::{FsTemporalLog, InMemoryTemporalLog, KeyRecord, StreamKey, TemporalLog};
use arbor_refs::{FsRegistry, InMemoryRegistry, Owner, OwnershipRegistry};
use arbor_store::{BlobStore, EncodedValue, FsBlobStore, InMemoryBlobStore};
use arbor_sync::{CallContext, Peer, Pending, ValuePayload};
use arbor_types::{
    Branch, BranchId, BranchSpec, ContentHash, Key, PeerId, SessionIdentity, StoredValue, Timestamp,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::branch::BranchHandle;
use crate::config::NodeConfig;
use crate::directory::PeerDirectory;
use crate::error::{SdkError, SdkResult};
use crate::local::LocalPeer;
use crate::locks::KeyLocks;

/// Branches this node knows about, and which one callers get by default.
#[derive(Default)]
pub(crate) struct BranchTable {
    pub(crate) default: Option<BranchId>,
    pub(crate) known: HashMap<BranchId, Branch>,
}

/// One member of an arbor deployment.
///
/// A node owns some subtrees of some branches and answers for every other key
/// by delegating to the peer that owns it.
pub struct Node {
    pub(crate) id: PeerId,
    pub(crate) session: SessionIdentity,
    pub(crate) config: NodeConfig,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) log: Arc<dyn TemporalLog>,
    pub(crate) registry: Arc<dyn OwnershipRegistry>,
    pub(crate) peers: PeerDirectory,
    pub(crate) branches: RwLock<BranchTable>,
    pub(crate) locks: KeyLocks,
    this: Weak<Node>,
}

impl Node {
    /// Open a node for `session`, with storage as `config` describes.
    pub fn open(session: SessionIdentity, config: NodeConfig) -> SdkResult<Arc<Self>> {
        config.validate()?;
        let (blobs, log, registry): (
            Arc<dyn BlobStore>,
            Arc<dyn TemporalLog>,
            Arc<dyn OwnershipRegistry>,
        ) = match &config.data_dir {
            Some(dir) => (
                Arc::new(FsBlobStore::open(dir.join("data"))?),
                Arc::new(FsTemporalLog::open_with_threshold(
                    dir.join("meta"),
                    config.checkpoint_threshold,
                )?),
                Arc::new(FsRegistry::open(dir.join("registry"))?),
            ),
            None => (
                Arc::new(InMemoryBlobStore::new()),
                Arc::new(InMemoryTemporalLog::with_threshold(config.checkpoint_threshold)),
                Arc::new(InMemoryRegistry::new()),
            ),
        };

        let id = PeerId::from_parts(&config.region, &session.instance_id);
        info!(node = %id, persistent = config.data_dir.is_some(), "node opened");

        Ok(Arc::new_cyclic(|this| Self {
            id,
            session,
            config,
            blobs,
            log,
            registry,
            peers: PeerDirectory::new(),
            branches: RwLock::new(BranchTable::default()),
            locks: KeyLocks::new(),
            this: this.clone(),
        }))
    }

    /// A node keeping everything in memory.
    pub fn in_memory(session: SessionIdentity) -> SdkResult<Arc<Self>> {
        Self::open(session, NodeConfig::default())
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn session(&self) -> &SessionIdentity {
        &self.session
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &dyn OwnershipRegistry {
        self.registry.as_ref()
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    /// Ids of the peers this node knows.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.ids()
    }

    /// A transport handle to this node, as handed to peers.
    pub fn client(&self) -> Arc<dyn Peer> {
        Arc::new(LocalPeer::new(
            self.this.clone(),
            self.id.clone(),
            self.session.clone(),
        ))
    }

    /// The tree store on the default branch.
    pub fn store(self: &Arc<Self>) -> BranchHandle {
        BranchHandle::new(self.clone(), BranchSpec::Default, Key::root())
    }

    /// The tree store on a specific branch.
    pub fn branch(self: &Arc<Self>, branch: impl Into<BranchSpec>) -> BranchHandle {
        BranchHandle::new(self.clone(), branch.into(), Key::root())
    }

    /// Start a root branch owned by this node and make it the default.
    ///
    /// Without an id, one is made from the node id and a random suffix.
    pub fn begin(&self, branch_id: Option<BranchId>) -> SdkResult<BranchId> {
        let branch_id = branch_id
            .unwrap_or_else(|| BranchId::new(format!("{}{}", self.id, random_suffix())));
        self.registry
            .set(&branch_id, &Key::root(), Owner::Peer(self.id.clone()))?;
        let mut table = self.branches.write().expect("lock poisoned");
        table.default = Some(branch_id.clone());
        table
            .known
            .insert(branch_id.clone(), Branch::root(branch_id.clone()));
        info!(node = %self.id, branch = %branch_id, "branch begun");
        Ok(branch_id)
    }

    pub fn default_branch_id(&self) -> Option<BranchId> {
        self.branches.read().expect("lock poisoned").default.clone()
    }

    // ---- Membership ----

    /// Join the deployment `remote` belongs to, adopting its default branch.
    ///
    /// Returns the number of members `remote` knows afterwards.
    pub async fn connect(&self, remote: Arc<dyn Peer>) -> SdkResult<usize> {
        let remote = remote.with_caller(self.own_context());
        Ok(remote.add_peer(self.client(), true, None, true).await?)
    }

    /// Introduce `peer` to this node (and, with `expand`, to every peer this
    /// node knows).
    pub async fn add_peer(
        &self,
        peer: Arc<dyn Peer>,
        pull_branch: bool,
        expand: bool,
    ) -> SdkResult<usize> {
        self.handle_add_peer(&self.own_context(), peer, pull_branch, None, expand)
            .await
    }

    /// Leave the deployment: every known peer is told to forget this node.
    pub async fn close(&self) -> SdkResult<()> {
        self.handle_close(&self.own_context()).await
    }

    pub(crate) async fn handle_add_peer(
        &self,
        context: &CallContext,
        peer: Arc<dyn Peer>,
        pull_branch: bool,
        branch: Option<Branch>,
        expand: bool,
    ) -> SdkResult<usize> {
        let caller = self.deployment_caller(context, "add_peer")?;
        if peer.id() == &self.id {
            return Ok(self.member_count());
        }
        let peer = peer.with_caller(self.own_context());

        if expand {
            for other in self.peers.handles() {
                if other.id() == peer.id() {
                    continue;
                }
                match other.add_peer(peer.clone(), false, None, false).await {
                    Ok(_) => {}
                    Err(e) if e.is_unreachable() => {
                        warn!(
                            node = %self.id,
                            peer = %other.id(),
                            "skipping unreachable peer while introducing"
                        )
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if caller.instance_id != peer.session().instance_id || expand {
            let pulled = if pull_branch { self.default_branch_record() } else { None };
            peer.add_peer(self.client(), false, pulled, false).await?;
        }

        if let Some(branch) = branch {
            self.registry
                .set(&branch.branch_id, &Key::root(), Owner::Peer(peer.id().clone()))?;
            let mut table = self.branches.write().expect("lock poisoned");
            table.default = Some(branch.branch_id.clone());
            table.known.insert(branch.branch_id.clone(), branch);
        }

        info!(node = %self.id, peer = %peer.id(), "peer added");
        self.peers.insert(peer);
        Ok(self.member_count())
    }

    pub(crate) async fn handle_close(&self, context: &CallContext) -> SdkResult<()> {
        let caller = self.deployment_caller(context, "close")?;
        if caller.instance_id == self.session.instance_id {
            for peer in self.peers.drain() {
                if let Err(e) = peer.close().await {
                    warn!(
                        node = %self.id,
                        peer = %peer.id(),
                        error = %e,
                        "peer did not acknowledge close"
                    );
                }
            }
            info!(node = %self.id, "node closed");
        } else if let Some(id) = self.peers.find_by_session(caller) {
            self.peers.remove(&id);
            info!(node = %self.id, peer = %id, "peer closed");
        }
        Ok(())
    }

    /// Members of the deployment as seen from here, this node included.
    fn member_count(&self) -> usize {
        self.peers.len() + 1
    }

    fn own_context(&self) -> CallContext {
        CallContext::from_caller(self.session.clone())
    }

    /// The caller, if it runs under this deployment's key.
    fn deployment_caller<'a>(
        &self,
        context: &'a CallContext,
        call: &str,
    ) -> SdkResult<&'a SessionIdentity> {
        context
            .caller
            .as_ref()
            .filter(|caller| caller.same_key(&self.session))
            .ok_or_else(|| {
                SdkError::Permission(format!("{call} requires a session of this deployment"))
            })
    }

    fn known_peer(&self, session: &SessionIdentity) -> Option<PeerId> {
        if !session.same_key(&self.session) || session.instance_id == self.session.instance_id {
            return None;
        }
        self.peers.find_by_session(session)
    }

    /// The peer a call comes from, or `None` for an external client.
    ///
    /// A relayed call from a peer on behalf of another known peer counts as
    /// coming from the latter.
    pub(crate) fn identify(&self, context: &CallContext) -> Option<PeerId> {
        self.origin(context).map(|(id, _)| id)
    }

    /// The peer a call comes from, with the session it runs under.
    fn origin<'a>(&self, context: &'a CallContext) -> Option<(PeerId, &'a SessionIdentity)> {
        let caller = context.caller.as_ref()?;
        let peer = self.known_peer(caller)?;
        match context.reply_to.as_ref() {
            Some(reply_to) => match self.known_peer(reply_to) {
                Some(relayed) => Some((relayed, reply_to)),
                None => Some((peer, caller)),
            },
            None => Some((peer, caller)),
        }
    }

    /// `peer`, called so that it sees the same requester we did.
    ///
    /// A call from another peer is forwarded with that peer as `reply_to`;
    /// anything else goes out as this node.
    pub(crate) fn relay(&self, context: &CallContext, peer: Arc<dyn Peer>) -> Arc<dyn Peer> {
        match self.origin(context) {
            Some((_, session)) => {
                peer.with_caller(self.own_context().with_reply_to(session.clone()))
            }
            None => peer,
        }
    }

    // ---- Branch resolution ----

    pub(crate) fn default_branch_record(&self) -> Option<Branch> {
        let table = self.branches.read().expect("lock poisoned");
        table
            .default
            .as_ref()
            .and_then(|id| table.known.get(id))
            .cloned()
    }

    pub(crate) fn known_branch(&self, id: &BranchId) -> Option<Branch> {
        self.branches.read().expect("lock poisoned").known.get(id).cloned()
    }

    pub(crate) fn remember_branch(&self, branch: Branch) {
        let mut table = self.branches.write().expect("lock poisoned");
        table.known.entry(branch.branch_id.clone()).or_insert(branch);
    }

    /// Turn a branch specifier into a full record.
    pub(crate) async fn resolve_branch(&self, spec: &BranchSpec) -> SdkResult<Branch> {
        match spec {
            BranchSpec::Default => self
                .default_branch_record()
                .ok_or_else(|| SdkError::BranchNotFound("no default branch".into())),
            BranchSpec::Id(id) => self
                .known_branch(id)
                .ok_or_else(|| SdkError::BranchNotFound(id.to_string())),
            BranchSpec::Named { key, name } => {
                let default = self
                    .default_branch_record()
                    .ok_or_else(|| SdkError::BranchNotFound("no default branch".into()))?;
                let branch = self
                    .lookup_branch(&default, key, name, None)
                    .await?
                    .ok_or_else(|| SdkError::BranchNotFound(format!("{name} at {key}")))?;
                self.remember_branch(branch.clone());
                Ok(branch)
            }
            BranchSpec::Record(branch) => {
                self.remember_branch(branch.clone());
                Ok(branch.clone())
            }
        }
    }

    /// Where a read of `key` on a forked branch continues: the origin branch,
    /// the key under the origin's subtree, and the capped timestamp.
    pub(crate) fn fallthrough(
        &self,
        branch: &Branch,
        key: &Key,
        at: Option<Timestamp>,
    ) -> Option<(Branch, Key, Timestamp)> {
        let origin_id = branch.origin_id.as_ref()?;
        let origin_timestamp = branch.origin_timestamp?;
        let at = at.map_or(origin_timestamp, |at| at.min(origin_timestamp));
        let origin = self
            .known_branch(origin_id)
            .unwrap_or_else(|| Branch::root(origin_id.clone()));
        let key = branch.origin_key.clone().unwrap_or_default().join(key);
        Some((origin, key, at))
    }

    // ---- Registry helpers ----

    /// The known owner registered for exactly `key`.
    pub(crate) fn owner_at(&self, branch: &BranchId, key: &Key) -> SdkResult<Option<PeerId>> {
        Ok(self
            .registry
            .get(branch, key)?
            .and_then(|owner| owner.peer().cloned()))
    }

    /// The handle for `owner`, clearing the entry at `key` if the peer is
    /// not known (any more).
    pub(crate) fn peer_for(
        &self,
        branch: &BranchId,
        key: &Key,
        owner: &PeerId,
    ) -> SdkResult<Option<Arc<dyn Peer>>> {
        match self.peers.get(owner) {
            Some(peer) => Ok(Some(peer)),
            None => {
                self.forget_owner(branch, key, owner)?;
                Ok(None)
            }
        }
    }

    pub(crate) fn forget_owner(
        &self,
        branch: &BranchId,
        key: &Key,
        owner: &PeerId,
    ) -> SdkResult<()> {
        warn!(node = %self.id, branch = %branch, key = %key, peer = %owner, "stale owner cleared");
        self.registry.clear(branch, key)?;
        Ok(())
    }

    // ---- Local storage helpers ----

    pub(crate) fn stream(&self, branch: &BranchId, key: &Key) -> StreamKey {
        StreamKey::new(branch.clone(), key.clone())
    }

    /// Whether this node holds any version of `key` up to `at`, not counting
    /// the origin marker of a branch root.
    pub(crate) fn has_versions(
        &self,
        branch: &BranchId,
        key: &Key,
        at: Option<Timestamp>,
    ) -> SdkResult<bool> {
        let versions = self
            .log
            .list_versions_ignoring(&self.stream(branch, key), at, &[ORIGIN_FIELD])?;
        Ok(!versions.is_empty())
    }

    pub(crate) fn read_record(
        &self,
        branch: &BranchId,
        key: &Key,
        at: Option<Timestamp>,
    ) -> SdkResult<KeyRecord> {
        Ok(KeyRecord::from_value(self.log.read(&self.stream(branch, key), at)?)?)
    }

    /// Append the compound metadata + value entry for a set.
    pub(crate) fn write_record(
        &self,
        branch: &BranchId,
        key: &Key,
        value: Option<&ContentHash>,
        metadata: Map<String, Value>,
        clear: bool,
    ) -> SdkResult<Timestamp> {
        let timestamp = self
            .log
            .append(&self.stream(branch, key), &KeyRecord::set_diff(metadata, value, clear))?;
        debug!(node = %self.id, branch = %branch, key = %key, %timestamp, "record written");
        Ok(timestamp)
    }

    /// Make sure the blob behind `payload` is stored here.
    pub(crate) async fn store_payload(&self, payload: ValuePayload) -> SdkResult<ContentHash> {
        match payload {
            ValuePayload::Inline(value) => Ok(self.blobs.write(&EncodedValue::encode(&value)?)?),
            ValuePayload::Deferred(pending) => {
                self.fetch_pending(&pending).await?;
                Ok(pending.hash)
            }
        }
    }

    /// Fetch a pending blob unless it is already stored.
    pub(crate) async fn fetch_pending(&self, pending: &Pending) -> SdkResult<()> {
        if !self.blobs.exists(&pending.hash)? {
            let bytes = pending.fetch().await?;
            self.blobs.write_verified(&pending.hash, bytes)?;
            debug!(node = %self.id, hash = %pending.hash, "pending blob fetched");
        }
        Ok(())
    }

    pub(crate) fn load_value(&self, hash: &ContentHash) -> SdkResult<Option<StoredValue>> {
        match self.blobs.read_encoded(hash)? {
            Some(encoded) => Ok(Some(encoded.decode()?)),
            None => Ok(None),
        }
    }

    /// Link `child` into the `children` of `parent`, unless it already is.
    pub(crate) fn link_child(&self, branch: &BranchId, parent: &Key, child: &Key) -> SdkResult<()> {
        let Some(segment) = child.last() else {
            return Ok(());
        };
        if self
            .read_record(branch, parent, None)?
            .children
            .iter()
            .any(|c| c == segment)
        {
            return Ok(());
        }
        self.log
            .append(&self.stream(branch, parent), &KeyRecord::add_child(segment))?;
        Ok(())
    }

    pub(crate) fn unlink_child(
        &self,
        branch: &BranchId,
        parent: &Key,
        segment: &str,
    ) -> SdkResult<()> {
        self.log
            .append(&self.stream(branch, parent), &KeyRecord::remove_child(segment))?;
        Ok(())
    }
}

/// Four url-safe characters from three random bytes.
pub(crate) fn random_suffix() -> String {
    let bytes: [u8; 3] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_sync::SyncError;

    fn session(instance: &str) -> SessionIdentity {
        SessionIdentity::new("deployment-key", instance)
    }

    fn node(instance: &str) -> Arc<Node> {
        Node::in_memory(session(instance)).unwrap()
    }

    // ---- identity ----

    #[test]
    fn id_is_region_and_instance() {
        let n = node("aaaaAAAA");
        assert_eq!(n.id().to_string(), "AAAAaaaaAAAA");

        let config = NodeConfig {
            region: "EU01".into(),
            ..NodeConfig::default()
        };
        let n = Node::open(session("bbbbBBBB"), config).unwrap();
        assert_eq!(n.id().to_string(), "EU01bbbbBBBB");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = NodeConfig {
            region: String::new(),
            ..NodeConfig::default()
        };
        assert!(matches!(
            Node::open(session("aaaaAAAA"), config),
            Err(SdkError::Config(_))
        ));
    }

    #[test]
    fn begin_registers_root_and_sets_default() {
        let n = node("aaaaAAAA");
        assert!(n.default_branch_id().is_none());

        let id = n.begin(Some(BranchId::new("AAAAaaaaAAAAcccc"))).unwrap();
        assert_eq!(n.default_branch_id(), Some(id.clone()));
        assert_eq!(
            n.registry().get(&id, &Key::root()).unwrap(),
            Some(Owner::Peer(n.id().clone()))
        );

        let generated = n.begin(None).unwrap();
        assert!(generated.to_string().starts_with("AAAAaaaaAAAA"));
        assert_eq!(generated.to_string().len(), "AAAAaaaaAAAA".len() + 4);
    }

    #[test]
    fn random_suffix_is_url_safe() {
        for _ in 0..32 {
            let s = random_suffix();
            assert_eq!(s.len(), 4);
            assert!(s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn identify_needs_a_known_peer_of_the_deployment() {
        let n = node("aaaaAAAA");
        let other = node("bbbbBBBB");
        assert_eq!(n.identify(&CallContext::local()), None);
        assert_eq!(n.identify(&CallContext::from_caller(session("bbbbBBBB"))), None);

        n.peers.insert(other.client());
        assert_eq!(
            n.identify(&CallContext::from_caller(session("bbbbBBBB"))),
            Some(other.id().clone())
        );
        // Same instance under a foreign key is an outsider.
        assert_eq!(
            n.identify(&CallContext::from_caller(SessionIdentity::new("other", "bbbbBBBB"))),
            None
        );
        // Our own session is never a peer.
        assert_eq!(n.identify(&CallContext::from_caller(session("aaaaAAAA"))), None);
    }

    #[test]
    fn reply_to_overrides_the_caller() {
        let n = node("aaaaAAAA");
        let b = node("bbbbBBBB");
        let c = node("ccccCCCC");
        n.peers.insert(b.client());
        n.peers.insert(c.client());

        let relayed =
            CallContext::from_caller(session("bbbbBBBB")).with_reply_to(session("ccccCCCC"));
        assert_eq!(n.identify(&relayed), Some(c.id().clone()));

        let unknown =
            CallContext::from_caller(session("bbbbBBBB")).with_reply_to(session("zzzzZZZZ"));
        assert_eq!(n.identify(&unknown), Some(b.id().clone()));
    }

    // ---- membership ----

    #[tokio::test]
    async fn connect_pulls_default_branch() {
        let d0 = node("aaaaAAAA");
        let d1 = node("BBBBbbbb");
        let r0 = d0.begin(Some(BranchId::new("AAAAaaaaAAAAcccc"))).unwrap();

        let members = d1.connect(d0.client()).await.unwrap();
        assert_eq!(members, 2);
        assert_eq!(d0.peer_ids(), vec![d1.id().clone()]);
        assert_eq!(d1.peer_ids(), vec![d0.id().clone()]);

        assert_eq!(d1.default_branch_id(), Some(r0.clone()));
        assert_eq!(
            d1.registry().get(&r0, &Key::root()).unwrap(),
            Some(Owner::Peer(d0.id().clone()))
        );
    }

    #[tokio::test]
    async fn expand_introduces_newcomer_to_everyone() {
        let d0 = node("aaaaAAAA");
        let d1 = node("bbbbBBBB");
        let d2 = node("ccccCCCC");
        d0.begin(None).unwrap();

        d1.connect(d0.client()).await.unwrap();
        let members = d2.connect(d0.client()).await.unwrap();
        assert_eq!(members, 3);

        let mut seen_by_d1 = d1.peer_ids();
        seen_by_d1.sort();
        let mut expected = vec![d0.id().clone(), d2.id().clone()];
        expected.sort();
        assert_eq!(seen_by_d1, expected);
        assert_eq!(d2.peer_ids().len(), 2);
        assert_eq!(d0.peer_ids().len(), 2);
    }

    #[tokio::test]
    async fn add_peer_requires_deployment_session() {
        let d0 = node("aaaaAAAA");
        let outsider = Node::in_memory(SessionIdentity::new("someone-else", "zzzzZZZZ")).unwrap();

        let anonymous = d0.client().add_peer(outsider.client(), false, None, false).await;
        assert!(matches!(anonymous, Err(SyncError::Permission(_))));

        let foreign = d0
            .client()
            .with_caller(CallContext::from_caller(outsider.session().clone()))
            .add_peer(outsider.client(), false, None, false)
            .await;
        assert!(matches!(foreign, Err(SyncError::Permission(_))));
        assert!(d0.peer_ids().is_empty());
    }

    #[tokio::test]
    async fn adding_self_is_a_no_op() {
        let d0 = node("aaaaAAAA");
        assert_eq!(d0.add_peer(d0.client(), false, false).await.unwrap(), 1);
        assert!(d0.peer_ids().is_empty());
    }

    #[tokio::test]
    async fn unreachable_peers_are_skipped_while_introducing() {
        let d0 = node("aaaaAAAA");
        d0.begin(None).unwrap();
        {
            let gone = node("bbbbBBBB");
            gone.connect(d0.client()).await.unwrap();
        }
        let d2 = node("ccccCCCC");
        assert_eq!(d2.connect(d0.client()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn close_detaches_from_every_peer() {
        let d0 = node("aaaaAAAA");
        let d1 = node("bbbbBBBB");
        let d2 = node("ccccCCCC");
        d0.begin(None).unwrap();
        d1.connect(d0.client()).await.unwrap();
        d2.connect(d0.client()).await.unwrap();

        d1.close().await.unwrap();
        assert!(d1.peer_ids().is_empty());
        assert_eq!(d0.peer_ids(), vec![d2.id().clone()]);
        assert_eq!(d2.peer_ids(), vec![d0.id().clone()]);
    }

    #[tokio::test]
    async fn close_requires_deployment_session() {
        let d0 = node("aaaaAAAA");
        assert!(matches!(
            d0.client().close().await,
            Err(SyncError::Permission(_))
        ));
    }
}
