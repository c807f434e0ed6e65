use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arbor_sync::{
    BranchInfoRequest, CallContext, CreateBranchRequest, GetReply, GetRequest, KeyQuery,
    SetRequest, UpdateRequest, ValuePayload,
};
use arbor_types::{Branch, BranchSpec, Key, StoredValue, Timestamp};
use serde_json::{Map, Value};

use crate::error::{SdkError, SdkResult};
use crate::node::Node;

/// What a set writes besides the key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetOptions {
    pub value: Option<StoredValue>,
    pub metadata: Map<String, Value>,
    /// Replace metadata and value instead of merging.
    pub clear: bool,
}

impl SetOptions {
    pub fn value(value: impl Into<StoredValue>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn metadata(metadata: Map<String, Value>) -> Self {
        Self {
            metadata,
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn clearing(mut self) -> Self {
        self.clear = true;
        self
    }
}

/// The tree store, seen through one branch from a key prefix down.
///
/// Keys passed to a handle are relative to its root.
#[derive(Clone)]
pub struct BranchHandle {
    node: Arc<Node>,
    branch: BranchSpec,
    root: Key,
}

impl BranchHandle {
    pub(crate) fn new(node: Arc<Node>, branch: BranchSpec, root: Key) -> Self {
        Self { node, branch, root }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn branch(&self) -> &BranchSpec {
        &self.branch
    }

    pub fn root(&self) -> &Key {
        &self.root
    }

    fn full(&self, key: impl Into<Key>) -> Key {
        self.root.join(&key.into())
    }

    fn query(&self, key: impl Into<Key>, at: Option<Timestamp>) -> KeyQuery {
        KeyQuery::new(self.full(key), at, self.branch.clone())
    }

    /// Write a value. Returns the version stamp, or `None` if no owner
    /// could be found.
    pub async fn set(
        &self,
        key: impl Into<Key>,
        value: impl Into<StoredValue>,
    ) -> SdkResult<Option<Timestamp>> {
        self.set_with(key, SetOptions::value(value)).await
    }

    pub async fn set_with(
        &self,
        key: impl Into<Key>,
        options: SetOptions,
    ) -> SdkResult<Option<Timestamp>> {
        let request = SetRequest {
            key: self.full(key),
            value: options.value.map(ValuePayload::Inline),
            metadata: options.metadata,
            clear: options.clear,
            branch: self.branch.clone(),
        };
        let ack = self.node.handle_set(&CallContext::local(), request).await?;
        Ok(ack.and_then(|ack| ack.timestamp))
    }

    /// The value at `key` as of `at` (latest when `None`).
    pub async fn get(
        &self,
        key: impl Into<Key>,
        at: Option<Timestamp>,
    ) -> SdkResult<Option<StoredValue>> {
        match self.read(key, false, at).await? {
            GetReply::Value(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    pub async fn get_metadata(
        &self,
        key: impl Into<Key>,
        at: Option<Timestamp>,
    ) -> SdkResult<Option<Map<String, Value>>> {
        match self.read(key, true, at).await? {
            GetReply::Metadata(metadata) => Ok(Some(metadata)),
            _ => Ok(None),
        }
    }

    async fn read(
        &self,
        key: impl Into<Key>,
        metadata: bool,
        at: Option<Timestamp>,
    ) -> SdkResult<GetReply> {
        let request = GetRequest {
            key: self.full(key),
            metadata,
            at,
            branch: self.branch.clone(),
        };
        self.node.handle_get(&CallContext::local(), request).await
    }

    /// Remove a key and everything below it.
    pub async fn remove(&self, key: impl Into<Key>) -> SdkResult<()> {
        self.node
            .handle_remove(&CallContext::local(), self.full(key), self.branch.clone())
            .await
    }

    pub async fn list(&self, key: impl Into<Key>, at: Option<Timestamp>) -> SdkResult<Vec<String>> {
        self.node
            .handle_list(&CallContext::local(), self.query(key, at))
            .await
    }

    /// Children whose metadata satisfies the expression `query`.
    pub async fn list_where(
        &self,
        key: impl Into<Key>,
        query: &str,
        at: Option<Timestamp>,
    ) -> SdkResult<Vec<String>> {
        self.node
            .list_where(&self.branch, &self.full(key), query, at)
            .await
    }

    pub async fn exists(&self, key: impl Into<Key>, at: Option<Timestamp>) -> SdkResult<bool> {
        let key = self.full(key);
        let (Some(parent), Some(last)) = (key.parent(), key.last()) else {
            return Ok(true);
        };
        let siblings = self
            .node
            .handle_list(&CallContext::local(), KeyQuery::new(parent, at, self.branch.clone()))
            .await?;
        Ok(siblings.iter().any(|s| s == last))
    }

    pub async fn list_versions(
        &self,
        key: impl Into<Key>,
        at: Option<Timestamp>,
    ) -> SdkResult<Vec<Timestamp>> {
        self.node
            .handle_list_versions(&CallContext::local(), self.query(key, at))
            .await
    }

    /// Names of the branches forked at `key`.
    pub async fn list_branches(
        &self,
        key: impl Into<Key>,
        at: Option<Timestamp>,
    ) -> SdkResult<Vec<String>> {
        self.node
            .handle_list_branches(&CallContext::local(), self.query(key, at))
            .await
    }

    /// Newest version of every key under `key`, relative to it.
    pub async fn tree(
        &self,
        key: impl Into<Key>,
        at: Option<Timestamp>,
    ) -> SdkResult<BTreeMap<Key, Timestamp>> {
        self.node.tree(&self.branch, &self.full(key), at).await
    }

    /// Fork this branch at `key`, as of `origin_timestamp` (now when `None`).
    pub async fn create_branch(
        &self,
        key: impl Into<Key>,
        name: &str,
        origin_timestamp: Option<Timestamp>,
    ) -> SdkResult<BranchHandle> {
        let key = self.full(key);
        let request = CreateBranchRequest {
            key: key.clone(),
            name: name.to_string(),
            origin: self.branch.clone(),
            origin_timestamp,
        };
        let branch = self
            .node
            .handle_create_branch(&CallContext::local(), request)
            .await?
            .ok_or_else(|| SdkError::BranchNotFound(format!("no owner for {key}")))?;
        Ok(self.at_branch(&branch))
    }

    /// The branch record forked at `key` under `name`.
    pub async fn branch_info(
        &self,
        key: impl Into<Key>,
        name: &str,
        at: Option<Timestamp>,
    ) -> SdkResult<Option<Branch>> {
        let request = BranchInfoRequest {
            key: self.full(key),
            name: name.to_string(),
            at,
            branch: self.branch.clone(),
        };
        self.node
            .handle_branch_info(&CallContext::local(), request)
            .await
    }

    /// A handle on the branch forked at `key` under `name`; with no name,
    /// this branch scoped at `key`.
    pub async fn get_branch(
        &self,
        key: impl Into<Key>,
        name: Option<&str>,
        at: Option<Timestamp>,
    ) -> SdkResult<BranchHandle> {
        let key = self.full(key);
        let Some(name) = name else {
            return Ok(Self::new(self.node.clone(), self.branch.clone(), key));
        };
        let current = self.node.resolve_branch(&self.branch).await?;
        let branch = self
            .node
            .lookup_branch(&current, &key, name, at)
            .await?
            .ok_or_else(|| SdkError::BranchNotFound(format!("{name} at {key}")))?;
        self.node.remember_branch(branch.clone());
        Ok(self.at_branch(&branch))
    }

    fn at_branch(&self, branch: &Branch) -> BranchHandle {
        Self::new(
            self.node.clone(),
            BranchSpec::Id(branch.branch_id.clone()),
            Key::root(),
        )
    }

    /// Apply expressions to metadata fields, if `condition` holds.
    ///
    /// Returns the metadata after the update.
    pub async fn update<I, F, E>(
        &self,
        key: impl Into<Key>,
        changes: I,
        condition: Option<&str>,
    ) -> SdkResult<Map<String, Value>>
    where
        I: IntoIterator<Item = (F, E)>,
        F: Into<String>,
        E: Into<String>,
    {
        let request = UpdateRequest {
            key: self.full(key),
            changes: changes
                .into_iter()
                .map(|(field, expr)| (field.into(), expr.into()))
                .collect(),
            condition: condition.map(str::to_string),
            branch: self.branch.clone(),
        };
        self.node
            .handle_update(&CallContext::local(), request)
            .await
    }

    /// Read-modify-write the value at `key`; see [`Node`] for the queueing
    /// rules. `None` uses the configured deadline.
    pub async fn update_value<F, Fut>(
        &self,
        key: impl Into<Key>,
        transform: F,
        timeout: Option<Duration>,
    ) -> SdkResult<Timestamp>
    where
        F: FnOnce(Option<StoredValue>) -> Fut,
        Fut: Future<Output = StoredValue>,
    {
        self.node
            .update_value(&self.branch, self.full(key), transform, timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use arbor_types::SessionIdentity;
    use serde_json::json;

    use super::*;

    #[test]
    fn set_options_builders() {
        let options = SetOptions::value("v");
        assert_eq!(options.value, Some(StoredValue::from("v")));
        assert!(options.metadata.is_empty());
        assert!(!options.clear);

        let mut metadata = Map::new();
        metadata.insert("a".into(), json!(1));
        let options = SetOptions::metadata(metadata.clone()).clearing();
        assert_eq!(options.value, None);
        assert_eq!(options.metadata, metadata);
        assert!(options.clear);
    }

    #[tokio::test]
    async fn scoped_handles_join_keys() {
        let node = Node::in_memory(SessionIdentity::new("pk", "aaaaAAAA")).unwrap();
        node.begin(None).unwrap();
        let store = node.store();
        assert!(store.root().is_root());
        assert_eq!(store.branch(), &BranchSpec::Default);

        let scoped = store.get_branch(["a"], None, None).await.unwrap();
        let nested = scoped.get_branch(["b"], None, None).await.unwrap();
        assert_eq!(nested.root(), &Key::from(["a", "b"]));

        nested.set(["c"], "deep").await.unwrap();
        assert_eq!(
            store.get(["a", "b", "c"], None).await.unwrap(),
            Some(StoredValue::from("deep"))
        );
        assert!(scoped.exists(["b", "c"], None).await.unwrap());
        assert!(!scoped.exists(["b", "d"], None).await.unwrap());
    }
}
