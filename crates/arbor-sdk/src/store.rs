//! The tree store protocol: set, get, remove, list, update.
//!
//! Every operation walks from the key up to the branch root and acts on the
//! first prefix with a known owner. If that owner is this node the operation
//! runs against local storage; otherwise it is delegated. An owner that is no
//! longer reachable is cleared from the registry and the walk continues
//! upward.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use arbor_gate::{Bindings, Expression};
use arbor_ledger::KeyRecord;
use arbor_refs::{Owner, OwnershipRegistry};
use arbor_store::{BlobStore, EncodedValue};
use arbor_sync::{
    CallContext, GetReply, GetRequest, KeyQuery, Pending, SetAck, SetRequest, SyncError,
    UpdateRequest, ValuePayload,
};
use arbor_types::{Branch, BranchId, BranchSpec, ContentHash, Key, PeerId, StoredValue, Timestamp};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{SdkError, SdkResult};
use crate::node::Node;

impl Node {
    // ---- set ----

    pub(crate) async fn handle_set(
        &self,
        context: &CallContext,
        request: SetRequest,
    ) -> SdkResult<Option<SetAck>> {
        let caller = self.identify(context);
        let branch = self.resolve_branch(&request.branch).await?;
        let request = SetRequest {
            branch: BranchSpec::Record(branch.clone()),
            ..request
        };
        match caller {
            Some(peer) => {
                self.set_for_peer(context, peer, &branch.branch_id, request)
                    .await
            }
            None => self.set_for_client(&branch.branch_id, request).await,
        }
    }

    /// A peer asks us to write. If we own the key we write it; if we own an
    /// ancestor, we hand the missing subtree to the caller and link it in.
    async fn set_for_peer(
        &self,
        context: &CallContext,
        caller: PeerId,
        branch: &BranchId,
        request: SetRequest,
    ) -> SdkResult<Option<SetAck>> {
        let key = request.key.clone();
        for (distance, prefix) in key.ancestors() {
            let Some(owner) = self.owner_at(branch, &prefix)? else {
                continue;
            };
            if owner == self.id {
                if distance == 0 {
                    self.registry
                        .set(branch, &key, Owner::Peer(self.id.clone()))?;
                    let hash = match request.value {
                        Some(payload) => Some(self.store_payload(payload).await?),
                        None => None,
                    };
                    let timestamp = self.write_record(
                        branch,
                        &key,
                        hash.as_ref(),
                        request.metadata,
                        request.clear,
                    )?;
                    return Ok(Some(SetAck {
                        root: prefix,
                        owner: self.id.clone(),
                        timestamp: Some(timestamp),
                    }));
                }
                let child = key.prefix(prefix.len() + 1);
                self.registry
                    .set(branch, &child, Owner::Peer(caller.clone()))?;
                self.link_child(branch, &prefix, &child)?;
                info!(
                    node = %self.id,
                    branch = %branch,
                    key = %child,
                    peer = %caller,
                    "subtree assigned to peer"
                );
                return Ok(Some(SetAck {
                    root: prefix,
                    owner: self.id.clone(),
                    timestamp: None,
                }));
            }
            let Some(peer) = self.peer_for(branch, &prefix, &owner)? else {
                continue;
            };
            debug!(node = %self.id, key = %key, peer = %owner, "relaying set");
            match self.relay(context, peer).set(request.clone()).await {
                Err(e) if e.is_unreachable() => self.forget_owner(branch, &prefix, &owner)?,
                result => return Ok(result?),
            }
        }
        Ok(None)
    }

    /// An external client asks us to write. The blob is stored here first;
    /// then the owner of the nearest registered prefix answers, and every
    /// key between that root and the written key becomes ours.
    async fn set_for_client(
        &self,
        branch: &BranchId,
        request: SetRequest,
    ) -> SdkResult<Option<SetAck>> {
        let key = request.key.clone();
        let (hash, encoded) = match &request.value {
            Some(ValuePayload::Inline(value)) => {
                let encoded = EncodedValue::encode(value)?;
                (Some(self.blobs.write(&encoded)?), Some(encoded))
            }
            Some(ValuePayload::Deferred(pending)) => {
                self.fetch_pending(pending).await?;
                (Some(pending.hash.clone()), None)
            }
            None => (None, None),
        };

        for (_, prefix) in key.ancestors() {
            let Some(owner) = self.owner_at(branch, &prefix)? else {
                continue;
            };
            let (root, root_owner, remote_timestamp) = if owner == self.id {
                (prefix, self.id.clone(), None)
            } else {
                let Some(peer) = self.peer_for(branch, &prefix, &owner)? else {
                    continue;
                };
                let mut forwarded = request.clone();
                if let (Some(hash), Some(encoded)) = (&hash, &encoded) {
                    if encoded.size() > self.config.large_value_threshold {
                        forwarded.value = Some(ValuePayload::Deferred(Pending::buffered(
                            hash.clone(),
                            encoded.data.clone(),
                        )));
                    }
                }
                debug!(node = %self.id, key = %key, peer = %owner, "delegating set");
                match peer.set(forwarded).await {
                    Ok(Some(ack)) => (ack.root, ack.owner, ack.timestamp),
                    Ok(None) => return Ok(None),
                    Err(e) if e.is_unreachable() => {
                        self.forget_owner(branch, &prefix, &owner)?;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            self.registry
                .set(branch, &root, Owner::Peer(root_owner.clone()))?;

            if root != key {
                let timestamp = self.write_record(
                    branch,
                    &key,
                    hash.as_ref(),
                    request.metadata,
                    request.clear,
                )?;
                self.registry
                    .set(branch, &key, Owner::Peer(self.id.clone()))?;
                for (_, ancestor) in key.ancestors().skip(1) {
                    let child = key.prefix(ancestor.len() + 1);
                    if ancestor == root {
                        if root_owner == self.id {
                            self.link_child(branch, &ancestor, &child)?;
                        }
                        break;
                    }
                    self.registry
                        .set(branch, &ancestor, Owner::Peer(self.id.clone()))?;
                    self.link_child(branch, &ancestor, &child)?;
                }
                return Ok(Some(SetAck {
                    root,
                    owner: root_owner,
                    timestamp: Some(timestamp),
                }));
            }

            let timestamp = if root_owner == self.id {
                Some(self.write_record(
                    branch,
                    &key,
                    hash.as_ref(),
                    request.metadata,
                    request.clear,
                )?)
            } else {
                remote_timestamp
            };
            return Ok(Some(SetAck {
                root,
                owner: root_owner,
                timestamp,
            }));
        }
        Ok(None)
    }

    // ---- get ----

    pub(crate) async fn handle_get(
        &self,
        context: &CallContext,
        request: GetRequest,
    ) -> SdkResult<GetReply> {
        let for_peer = self.identify(context).is_some();
        let branch = self.resolve_branch(&request.branch).await?;
        let bid = &branch.branch_id;
        let request = GetRequest {
            branch: BranchSpec::Record(branch.clone()),
            ..request
        };

        for (_, prefix) in request.key.ancestors() {
            let Some(owner) = self.owner_at(bid, &prefix)? else {
                continue;
            };
            if owner == self.id {
                return self.get_local(for_peer, &branch, &request).await;
            }
            let Some(peer) = self.peer_for(bid, &prefix, &owner)? else {
                continue;
            };
            match self.relay(context, peer).get(request.clone()).await {
                Err(e) if e.is_unreachable() => self.forget_owner(bid, &prefix, &owner)?,
                Err(e) => return Err(e.into()),
                Ok(reply) if for_peer => return Ok(reply),
                Ok(reply) => return self.settle(reply).await,
            }
        }
        Ok(GetReply::Missing)
    }

    async fn get_local(
        &self,
        for_peer: bool,
        branch: &Branch,
        request: &GetRequest,
    ) -> SdkResult<GetReply> {
        let bid = &branch.branch_id;
        if self.has_versions(bid, &request.key, request.at)? {
            let record = self.read_record(bid, &request.key, request.at)?;
            if request.metadata {
                return Ok(GetReply::Metadata(record.metadata));
            }
            let Some(hash) = record.value else {
                return Ok(GetReply::Missing);
            };
            let Some(encoded) = self.blobs.read_encoded(&hash)? else {
                return Ok(GetReply::Missing);
            };
            if for_peer && encoded.size() > self.config.large_value_threshold {
                return Ok(GetReply::Getter(Pending::buffered(hash, encoded.data)));
            }
            return Ok(GetReply::Value(encoded.decode()?));
        }

        match self.fallthrough(branch, &request.key, request.at) {
            Some((origin, key, at)) => {
                debug!(
                    node = %self.id,
                    branch = %bid,
                    key = %request.key,
                    origin = %origin.branch_id,
                    "reading through to origin"
                );
                let reply = self
                    .client()
                    .get(GetRequest {
                        key,
                        metadata: request.metadata,
                        at: Some(at),
                        branch: BranchSpec::Record(origin),
                    })
                    .await?;
                Ok(reply)
            }
            None => Ok(GetReply::Missing),
        }
    }

    /// Resolve a getter into a value, caching the blob here.
    async fn settle(&self, reply: GetReply) -> SdkResult<GetReply> {
        match reply {
            GetReply::Getter(pending) => {
                self.fetch_pending(&pending).await?;
                Ok(self
                    .load_value(&pending.hash)?
                    .map_or(GetReply::Missing, GetReply::Value))
            }
            other => Ok(other),
        }
    }

    // ---- remove ----

    pub(crate) async fn handle_remove(
        &self,
        context: &CallContext,
        key: Key,
        branch: BranchSpec,
    ) -> SdkResult<()> {
        let from_client = self.identify(context).is_none();
        let branch = self.resolve_branch(&branch).await?;
        let bid = &branch.branch_id;
        let spec = BranchSpec::Record(branch.clone());

        if from_client {
            let children = self
                .handle_list(context, KeyQuery::new(key.clone(), None, spec.clone()))
                .await?;
            let client = self.client();
            try_join_all(
                children
                    .into_iter()
                    .map(|child| client.remove(key.child(child), spec.clone())),
            )
            .await?;
        }

        let mut tombstoned = false;
        for (distance, prefix) in key.ancestors() {
            let Some(owner) = self.owner_at(bid, &prefix)? else {
                continue;
            };
            if distance == 0 && !key.is_root() {
                self.registry.clear(bid, &key)?;
            }
            if owner == self.id {
                if !tombstoned && self.has_versions(bid, &key, None)? {
                    self.write_record(bid, &key, None, Map::new(), true)?;
                    tombstoned = true;
                    debug!(node = %self.id, branch = %bid, key = %key, "key tombstoned");
                }
                if distance == 0 {
                    continue;
                }
                if let (Some(parent), Some(segment)) = (key.parent(), key.last()) {
                    self.unlink_child(bid, &parent, segment)?;
                }
                return Ok(());
            }
            let Some(peer) = self.peer_for(bid, &prefix, &owner)? else {
                continue;
            };
            match self.relay(context, peer).remove(key.clone(), spec.clone()).await {
                Err(e) if e.is_unreachable() => self.forget_owner(bid, &prefix, &owner)?,
                result => return Ok(result?),
            }
        }
        Ok(())
    }

    // ---- list / versions / branches ----

    pub(crate) async fn handle_list(
        &self,
        context: &CallContext,
        query: KeyQuery,
    ) -> SdkResult<Vec<String>> {
        let branch = self.resolve_branch(&query.branch).await?;
        let bid = &branch.branch_id;
        let query = KeyQuery {
            branch: BranchSpec::Record(branch.clone()),
            ..query
        };

        for (_, prefix) in query.key.ancestors() {
            let Some(owner) = self.owner_at(bid, &prefix)? else {
                continue;
            };
            if owner == self.id {
                if self.has_versions(bid, &query.key, query.at)? {
                    return Ok(self.read_record(bid, &query.key, query.at)?.children);
                }
                return match self.fallthrough(&branch, &query.key, query.at) {
                    Some((origin, key, at)) => Ok(self
                        .client()
                        .list(KeyQuery::new(key, Some(at), BranchSpec::Record(origin)))
                        .await?),
                    None => Ok(Vec::new()),
                };
            }
            let Some(peer) = self.peer_for(bid, &prefix, &owner)? else {
                continue;
            };
            match self.relay(context, peer).list(query.clone()).await {
                Err(e) if e.is_unreachable() => self.forget_owner(bid, &prefix, &owner)?,
                result => return Ok(result?),
            }
        }
        Ok(Vec::new())
    }

    pub(crate) async fn handle_list_versions(
        &self,
        context: &CallContext,
        query: KeyQuery,
    ) -> SdkResult<Vec<Timestamp>> {
        let branch = self.resolve_branch(&query.branch).await?;
        let bid = &branch.branch_id;
        let query = KeyQuery {
            branch: BranchSpec::Record(branch.clone()),
            ..query
        };

        for (_, prefix) in query.key.ancestors() {
            let Some(owner) = self.owner_at(bid, &prefix)? else {
                continue;
            };
            if owner == self.id {
                let versions = self.log.list_versions_ignoring(
                    &self.stream(bid, &query.key),
                    query.at,
                    &[arbor_ledger::record::ORIGIN_FIELD],
                )?;
                if !versions.is_empty() {
                    return Ok(versions);
                }
                return match self.fallthrough(&branch, &query.key, query.at) {
                    Some((origin, key, at)) => Ok(self
                        .client()
                        .list_versions(KeyQuery::new(key, Some(at), BranchSpec::Record(origin)))
                        .await?),
                    None => Ok(Vec::new()),
                };
            }
            let Some(peer) = self.peer_for(bid, &prefix, &owner)? else {
                continue;
            };
            match self.relay(context, peer).list_versions(query.clone()).await {
                Err(e) if e.is_unreachable() => self.forget_owner(bid, &prefix, &owner)?,
                result => return Ok(result?),
            }
        }
        Ok(Vec::new())
    }

    pub(crate) async fn handle_list_branches(
        &self,
        context: &CallContext,
        query: KeyQuery,
    ) -> SdkResult<Vec<String>> {
        let branch = self.resolve_branch(&query.branch).await?;
        let bid = &branch.branch_id;
        let query = KeyQuery {
            branch: BranchSpec::Record(branch.clone()),
            ..query
        };

        for (_, prefix) in query.key.ancestors() {
            let Some(owner) = self.owner_at(bid, &prefix)? else {
                continue;
            };
            if owner == self.id {
                let record = self.read_record(bid, &query.key, query.at)?;
                return Ok(record.branches.into_keys().collect());
            }
            let Some(peer) = self.peer_for(bid, &prefix, &owner)? else {
                continue;
            };
            match self.relay(context, peer).list_branches(query.clone()).await {
                Err(e) if e.is_unreachable() => self.forget_owner(bid, &prefix, &owner)?,
                result => return Ok(result?),
            }
        }
        Ok(Vec::new())
    }

    /// Children of `key` whose metadata satisfies `query`.
    pub(crate) async fn list_where(
        &self,
        branch: &BranchSpec,
        key: &Key,
        query: &str,
        at: Option<Timestamp>,
    ) -> SdkResult<Vec<String>> {
        let expression = Expression::compile(query)?;
        let children = self
            .handle_list(&CallContext::local(), KeyQuery::new(key.clone(), at, branch.clone()))
            .await?;
        let client = self.client();
        let replies = try_join_all(children.iter().map(|child| {
            client.get(GetRequest {
                key: key.child(child.as_str()),
                metadata: true,
                at,
                branch: branch.clone(),
            })
        }))
        .await?;

        let mut matching = Vec::new();
        for (child, reply) in children.into_iter().zip(replies) {
            let metadata = match reply {
                GetReply::Metadata(metadata) => metadata,
                _ => Map::new(),
            };
            if expression.test(&Bindings::from_metadata(&metadata))? {
                matching.push(child);
            }
        }
        Ok(matching)
    }

    /// Every key under `key` (relative to it) with its newest version up to
    /// `at`. Keys without versions are left out.
    pub(crate) async fn tree(
        &self,
        branch: &BranchSpec,
        key: &Key,
        at: Option<Timestamp>,
    ) -> SdkResult<BTreeMap<Key, Timestamp>> {
        let client = self.client();
        let mut tree = BTreeMap::new();
        let mut frontier = vec![Key::root()];

        while !frontier.is_empty() {
            let level = try_join_all(frontier.iter().map(|relative| {
                let full = key.join(relative);
                let client = client.clone();
                let branch = branch.clone();
                async move {
                    let versions = client
                        .list_versions(KeyQuery::new(full.clone(), at, branch.clone()))
                        .await?;
                    let children = client.list(KeyQuery::new(full, at, branch)).await?;
                    Ok::<_, SyncError>((versions, children))
                }
            }))
            .await?;

            let mut next = Vec::new();
            for (relative, (versions, children)) in frontier.into_iter().zip(level) {
                if let Some(latest) = versions.last() {
                    tree.insert(relative.clone(), *latest);
                }
                next.extend(children.into_iter().map(|child| relative.child(child)));
            }
            frontier = next;
        }
        Ok(tree)
    }

    // ---- update ----

    pub(crate) async fn handle_update(
        &self,
        context: &CallContext,
        request: UpdateRequest,
    ) -> SdkResult<Map<String, Value>> {
        let branch = self.resolve_branch(&request.branch).await?;
        let bid = &branch.branch_id;
        let key = request.key.clone();

        match self.owner_at(bid, &key)? {
            Some(owner) if owner == self.id => self.update_local(bid, &request).await,
            Some(owner) => {
                let peer = self
                    .peers
                    .get(&owner)
                    .ok_or_else(|| SdkError::NotOwned { key: key.clone() })?;
                let forwarded = UpdateRequest {
                    branch: BranchSpec::Record(branch.clone()),
                    ..request
                };
                match self.relay(context, peer).update(forwarded).await {
                    Err(e) if e.is_unreachable() => {
                        self.forget_owner(bid, &key, &owner)?;
                        Err(SdkError::NotOwned { key })
                    }
                    result => Ok(result?),
                }
            }
            None => Err(SdkError::NotOwned { key }),
        }
    }

    async fn update_local(
        &self,
        branch: &BranchId,
        request: &UpdateRequest,
    ) -> SdkResult<Map<String, Value>> {
        let stream = self.stream(branch, &request.key);
        let _guard = self.locks.lock(&stream).await;

        let record = self.read_record(branch, &request.key, None)?;
        let bindings = Bindings::from_metadata(&record.metadata);
        if let Some(condition) = &request.condition {
            if !Expression::compile(condition)?.test(&bindings)? {
                return Err(SdkError::ConditionNotFulfilled(condition.clone()));
            }
        }

        let mut changes = Map::new();
        for (field, source) in &request.changes {
            changes.insert(field.clone(), Expression::compile(source)?.eval(&bindings)?);
        }
        self.log
            .append(&stream, &KeyRecord::update_metadata(changes.clone()))?;

        let mut metadata = record.metadata;
        metadata.extend(changes);
        Ok(metadata)
    }

    /// Read-modify-write of a key's value, serialized with every other
    /// update of the same key on this node.
    ///
    /// The key must be registered to this node. A transform that does not
    /// finish within `timeout` fails the update and leaves the value as it
    /// was; the next queued updater still gets its turn.
    pub(crate) async fn update_value<F, Fut>(
        &self,
        branch: &BranchSpec,
        key: Key,
        transform: F,
        timeout: Option<Duration>,
    ) -> SdkResult<Timestamp>
    where
        F: FnOnce(Option<StoredValue>) -> Fut,
        Fut: Future<Output = StoredValue>,
    {
        let branch = self.resolve_branch(branch).await?;
        let bid = &branch.branch_id;
        if self.owner_at(bid, &key)?.as_ref() != Some(&self.id) {
            return Err(SdkError::NotOwned { key });
        }

        let stream = self.stream(bid, &key);
        let _guard = self.locks.lock(&stream).await;

        let previous = match self.read_record(bid, &key, None)?.value {
            Some(hash) => self.load_value(&hash)?,
            None => None,
        };
        let limit = timeout.unwrap_or_else(|| self.config.update_timeout());
        let next = tokio::time::timeout(limit, transform(previous))
            .await
            .map_err(|_| SdkError::Timeout(limit))?;

        let hash: ContentHash = self.blobs.write(&EncodedValue::encode(&next)?)?;
        self.write_record(bid, &key, Some(&hash), Map::new(), false)
    }
}
