//! Forking branches and looking them up.
//!
//! A branch is recorded under the `branches` field of its fork point on the
//! origin branch, by name. Its root is owned by the node that asked for the
//! fork and carries an `origin` marker.

use arbor_ledger::KeyRecord;
use arbor_refs::{validate_branch_name, Owner, OwnershipRegistry};
use arbor_sync::{BranchInfoRequest, CallContext, CreateBranchRequest};
use arbor_types::{Branch, BranchId, BranchSpec, Key, Timestamp};
use tracing::info;

use crate::error::SdkResult;
use crate::node::{random_suffix, Node};

impl Node {
    pub(crate) async fn handle_create_branch(
        &self,
        context: &CallContext,
        request: CreateBranchRequest,
    ) -> SdkResult<Option<Branch>> {
        validate_branch_name(&request.name)?;
        let caller = self.identify(context);
        let origin = self.resolve_branch(&request.origin).await?;
        let origin_id = &origin.branch_id;
        let key = &request.key;

        for (_, prefix) in key.ancestors() {
            let Some(owner) = self.owner_at(origin_id, &prefix)? else {
                continue;
            };
            if owner == self.id {
                let claimant = caller.clone().unwrap_or_else(|| self.id.clone());
                let branch = Branch::fork(
                    BranchId::new(format!("{claimant}{}", random_suffix())),
                    origin_id.clone(),
                    request.origin_timestamp.unwrap_or_else(Timestamp::now),
                    key.clone(),
                );
                self.log.append(
                    &self.stream(origin_id, key),
                    &KeyRecord::add_branch(&request.name, &branch)?,
                )?;
                self.registry
                    .set(&branch.branch_id, &Key::root(), Owner::Peer(claimant.clone()))?;
                self.remember_branch(branch.clone());
                if caller.is_none() {
                    self.mark_origin(&branch)?;
                }
                info!(
                    node = %self.id,
                    branch = %branch.branch_id,
                    origin = %origin_id,
                    key = %key,
                    name = %request.name,
                    owner = %claimant,
                    "branch created"
                );
                return Ok(Some(branch));
            }

            let Some(peer) = self.peer_for(origin_id, &prefix, &owner)? else {
                continue;
            };
            let forwarded = CreateBranchRequest {
                origin: BranchSpec::Record(origin.clone()),
                ..request.clone()
            };
            match self.relay(context, peer).create_branch(forwarded).await {
                Err(e) if e.is_unreachable() => self.forget_owner(origin_id, &prefix, &owner)?,
                Err(e) => return Err(e.into()),
                Ok(None) => return Ok(None),
                Ok(Some(branch)) => {
                    // Relayed for a peer: the root is theirs to mark.
                    let claimant = caller.clone().unwrap_or_else(|| self.id.clone());
                    self.registry
                        .set(&branch.branch_id, &Key::root(), Owner::Peer(claimant))?;
                    self.remember_branch(branch.clone());
                    if caller.is_none() {
                        self.mark_origin(&branch)?;
                    }
                    return Ok(Some(branch));
                }
            }
        }
        Ok(None)
    }

    fn mark_origin(&self, branch: &Branch) -> SdkResult<()> {
        self.log.append(
            &self.stream(&branch.branch_id, &Key::root()),
            &KeyRecord::origin_marker(branch)?,
        )?;
        Ok(())
    }

    pub(crate) async fn handle_branch_info(
        &self,
        context: &CallContext,
        request: BranchInfoRequest,
    ) -> SdkResult<Option<Branch>> {
        let branch = self.resolve_branch(&request.branch).await?;
        self.lookup_branch_for(context, &branch, &request.key, &request.name, request.at)
            .await
    }

    /// The branch forked at `key` on `branch` under `name`, asking the owner
    /// of `key` if that is not us.
    pub(crate) async fn lookup_branch(
        &self,
        branch: &Branch,
        key: &Key,
        name: &str,
        at: Option<Timestamp>,
    ) -> SdkResult<Option<Branch>> {
        self.lookup_branch_for(&CallContext::local(), branch, key, name, at)
            .await
    }

    async fn lookup_branch_for(
        &self,
        context: &CallContext,
        branch: &Branch,
        key: &Key,
        name: &str,
        at: Option<Timestamp>,
    ) -> SdkResult<Option<Branch>> {
        let bid = &branch.branch_id;
        for (_, prefix) in key.ancestors() {
            let Some(owner) = self.owner_at(bid, &prefix)? else {
                continue;
            };
            if owner == self.id {
                let mut record = self.read_record(bid, key, at)?;
                return Ok(record.branches.remove(name));
            }
            let Some(peer) = self.peer_for(bid, &prefix, &owner)? else {
                continue;
            };
            let request = BranchInfoRequest {
                key: key.clone(),
                name: name.to_string(),
                at,
                branch: BranchSpec::Record(branch.clone()),
            };
            match self.relay(context, peer).branch_info(request).await {
                Err(e) if e.is_unreachable() => self.forget_owner(bid, &prefix, &owner)?,
                result => return Ok(result?),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use arbor_types::{SessionIdentity, StoredValue};

    use super::*;
    use crate::error::SdkError;

    fn node(instance: &str) -> Arc<Node> {
        Node::in_memory(SessionIdentity::new("pk", instance)).unwrap()
    }

    async fn tick() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // ---- local forks ----

    #[tokio::test]
    async fn fork_reads_through_to_origin_snapshot() {
        let d0 = node("aaaaAAAA");
        let r0 = d0.begin(None).unwrap();
        let store = d0.store();
        store.set(["proj", "file"], "v1").await.unwrap();
        tick().await;

        let draft = store.create_branch(["proj"], "draft", None).await.unwrap();
        tick().await;
        store.set(["proj", "file"], "v2").await.unwrap();

        assert_eq!(draft.get(["file"], None).await.unwrap(), Some(StoredValue::from("v1")));
        assert_eq!(draft.list(Key::root(), None).await.unwrap(), vec!["file".to_string()]);
        assert_eq!(draft.list_versions(["file"], None).await.unwrap().len(), 1);
        assert_eq!(store.get(["proj", "file"], None).await.unwrap(), Some(StoredValue::from("v2")));

        let BranchSpec::Id(draft_id) = draft.branch().clone() else {
            panic!("fork handle should name its branch by id");
        };
        assert!(draft_id.to_string().starts_with(d0.id().as_str()));
        assert_eq!(
            d0.registry().get(&draft_id, &Key::root()).unwrap(),
            Some(Owner::Peer(d0.id().clone()))
        );
        let root = d0.read_record(&draft_id, &Key::root(), None).unwrap();
        assert_eq!(root.origin.map(|b| b.origin_id), Some(Some(r0)));
    }

    #[tokio::test]
    async fn writes_on_a_fork_stay_there() {
        let d0 = node("aaaaAAAA");
        d0.begin(None).unwrap();
        let store = d0.store();
        store.set(["proj", "file"], "v1").await.unwrap();

        let draft = store.create_branch(["proj"], "draft", None).await.unwrap();
        draft.set(["file"], "edited").await.unwrap();
        draft.set(["notes"], "new").await.unwrap();

        assert_eq!(draft.get(["file"], None).await.unwrap(), Some(StoredValue::from("edited")));
        assert_eq!(store.get(["proj", "file"], None).await.unwrap(), Some(StoredValue::from("v1")));
        assert!(!store.exists(["proj", "notes"], None).await.unwrap());
        assert!(draft.exists(["notes"], None).await.unwrap());
    }

    #[tokio::test]
    async fn fork_at_a_past_timestamp() {
        let d0 = node("aaaaAAAA");
        d0.begin(None).unwrap();
        let store = d0.store();
        let t1 = store.set(["doc"], "first").await.unwrap().unwrap();
        tick().await;
        store.set(["doc"], "second").await.unwrap();

        let old = store.create_branch(Key::root(), "old", Some(t1)).await.unwrap();
        assert_eq!(old.get(["doc"], None).await.unwrap(), Some(StoredValue::from("first")));
    }

    #[tokio::test]
    async fn branches_are_listed_and_looked_up_by_name() {
        let d0 = node("aaaaAAAA");
        d0.begin(None).unwrap();
        let store = d0.store();
        store.set(["proj", "file"], "v1").await.unwrap();
        let draft = store.create_branch(["proj"], "draft", None).await.unwrap();
        store.create_branch(["proj"], "review/1", None).await.unwrap();

        assert_eq!(
            store.list_branches(["proj"], None).await.unwrap(),
            vec!["draft".to_string(), "review/1".to_string()]
        );

        let info = store.branch_info(["proj"], "draft", None).await.unwrap().unwrap();
        assert_eq!(BranchSpec::Id(info.branch_id.clone()), *draft.branch());
        assert_eq!(info.origin_key, Some(Key::from(["proj"])));
        assert_eq!(store.branch_info(["proj"], "nope", None).await.unwrap(), None);

        let found = store.get_branch(["proj"], Some("draft"), None).await.unwrap();
        assert_eq!(found.branch(), draft.branch());
        assert!(matches!(
            store.get_branch(["proj"], Some("nope"), None).await,
            Err(SdkError::BranchNotFound(_))
        ));

        let named = d0.branch(BranchSpec::Named {
            key: Key::from(["proj"]),
            name: "draft".into(),
        });
        assert_eq!(named.get(["file"], None).await.unwrap(), Some(StoredValue::from("v1")));
    }

    #[tokio::test]
    async fn unnamed_get_branch_scopes_the_handle() {
        let d0 = node("aaaaAAAA");
        d0.begin(None).unwrap();
        let store = d0.store();
        store.set(["proj", "file"], "v1").await.unwrap();

        let scoped = store.get_branch(["proj"], None, None).await.unwrap();
        assert_eq!(scoped.root(), &Key::from(["proj"]));
        assert_eq!(scoped.get(["file"], None).await.unwrap(), Some(StoredValue::from("v1")));
    }

    #[tokio::test]
    async fn invalid_branch_names_are_rejected() {
        let d0 = node("aaaaAAAA");
        d0.begin(None).unwrap();
        for name in ["", "a..b", "has space", "/lead"] {
            assert!(
                matches!(
                    d0.store().create_branch(Key::root(), name, None).await,
                    Err(SdkError::Ref(_))
                ),
                "{name:?}"
            );
        }
    }

    #[tokio::test]
    async fn unknown_branch_id_is_not_found() {
        let d0 = node("aaaaAAAA");
        d0.begin(None).unwrap();
        let ghost = d0.branch(BranchId::new("ghost"));
        assert!(matches!(
            ghost.get(["x"], None).await,
            Err(SdkError::BranchNotFound(_))
        ));
    }

    // ---- forks across peers ----

    #[tokio::test]
    async fn peer_forks_a_subtree_it_does_not_own() {
        let d0 = node("aaaaAAAA");
        let d1 = node("BBBBbbbb");
        d0.begin(None).unwrap();
        d1.connect(d0.client()).await.unwrap();
        d0.store().set(["proj", "file"], "v1").await.unwrap();

        let fork = d1.store().create_branch(["proj"], "mine", None).await.unwrap();
        let BranchSpec::Id(fork_id) = fork.branch().clone() else {
            panic!("fork handle should name its branch by id");
        };
        assert!(fork_id.to_string().starts_with(d1.id().as_str()));
        assert_eq!(
            d0.registry().get(&fork_id, &Key::root()).unwrap(),
            Some(Owner::Peer(d1.id().clone()))
        );
        assert_eq!(
            d1.registry().get(&fork_id, &Key::root()).unwrap(),
            Some(Owner::Peer(d1.id().clone()))
        );

        assert_eq!(fork.get(["file"], None).await.unwrap(), Some(StoredValue::from("v1")));
        fork.set(["file"], "v2").await.unwrap();

        let seen_from_d0 = d0.branch(fork_id);
        assert_eq!(
            seen_from_d0.get(["file"], None).await.unwrap(),
            Some(StoredValue::from("v2"))
        );
        assert_eq!(
            d0.store().get(["proj", "file"], None).await.unwrap(),
            Some(StoredValue::from("v1"))
        );
        assert_eq!(
            d1.store().list_branches(["proj"], None).await.unwrap(),
            vec!["mine".to_string()]
        );
    }
}
