use std::collections::BTreeMap;

use arbor_types::{BranchSpec, Key, PeerId, SessionIdentity, StoredValue, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pending::Pending;

/// Who is making a call, as vouched for by the transport.
///
/// `caller` is `None` for in-process calls by the node's own user. A call
/// relayed on someone's behalf may name the original requester in
/// `reply_to`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Option<SessionIdentity>,
    pub reply_to: Option<SessionIdentity>,
}

impl CallContext {
    /// A call from the node's own user, not from a peer.
    pub fn local() -> Self {
        Self::default()
    }

    pub fn from_caller(caller: SessionIdentity) -> Self {
        Self {
            caller: Some(caller),
            reply_to: None,
        }
    }

    pub fn with_reply_to(mut self, reply_to: SessionIdentity) -> Self {
        self.reply_to = Some(reply_to);
        self
    }
}

/// The value carried by a set.
#[derive(Clone, Debug)]
pub enum ValuePayload {
    /// The value itself.
    Inline(StoredValue),
    /// A large value passed by hash; bytes are fetched only if the owner
    /// does not hold the blob yet.
    Deferred(Pending),
}

/// Write a value and/or metadata at a key.
#[derive(Clone, Debug)]
pub struct SetRequest {
    pub key: Key,
    pub value: Option<ValuePayload>,
    pub metadata: Map<String, Value>,
    /// Replace metadata and value instead of merging into them.
    pub clear: bool,
    pub branch: BranchSpec,
}

impl SetRequest {
    pub fn new(key: Key, branch: BranchSpec) -> Self {
        Self {
            key,
            value: None,
            metadata: Map::new(),
            clear: false,
            branch,
        }
    }
}

/// Where a delegated set landed.
///
/// `root` is the prefix of the key whose owner answered, `owner` that
/// owner. `timestamp` is the log stamp when the owner wrote the key itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetAck {
    pub root: Key,
    pub owner: PeerId,
    pub timestamp: Option<Timestamp>,
}

/// Read a key's value or metadata as of `at` (latest when `None`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetRequest {
    pub key: Key,
    pub metadata: bool,
    pub at: Option<Timestamp>,
    pub branch: BranchSpec,
}

/// Answer to a [`GetRequest`].
#[derive(Clone, Debug)]
pub enum GetReply {
    Missing,
    Metadata(Map<String, Value>),
    Value(StoredValue),
    /// A large value the caller fetches lazily and caches by hash.
    Getter(Pending),
}

/// Key-scoped read used by list, list_versions and list_branches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyQuery {
    pub key: Key,
    pub at: Option<Timestamp>,
    pub branch: BranchSpec,
}

impl KeyQuery {
    pub fn new(key: Key, at: Option<Timestamp>, branch: BranchSpec) -> Self {
        Self { key, at, branch }
    }
}

/// Fork `origin` at `key`, recording the new branch under `name`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateBranchRequest {
    pub key: Key,
    pub name: String,
    pub origin: BranchSpec,
    /// Defaults to the time of the call.
    pub origin_timestamp: Option<Timestamp>,
}

/// Look up the branch forked at `key` under `name`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchInfoRequest {
    pub key: Key,
    pub name: String,
    pub at: Option<Timestamp>,
    pub branch: BranchSpec,
}

/// Conditionally change metadata fields using expressions.
///
/// Each entry of `changes` maps a metadata field to an expression evaluated
/// against the current metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub key: Key,
    pub changes: BTreeMap<String, String>,
    pub condition: Option<String>,
    pub branch: BranchSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_context_has_no_caller() {
        let ctx = CallContext::local();
        assert!(ctx.caller.is_none());
        assert!(ctx.reply_to.is_none());
    }

    #[test]
    fn relayed_context_keeps_both_identities() {
        let ctx = CallContext::from_caller(SessionIdentity::new("pk", "relay"))
            .with_reply_to(SessionIdentity::new("pk", "origin"));
        assert_eq!(ctx.caller.unwrap().instance_id, "relay");
        assert_eq!(ctx.reply_to.unwrap().instance_id, "origin");
    }

    #[test]
    fn set_request_defaults_to_merge() {
        let request = SetRequest::new(Key::from(["x"]), BranchSpec::Default);
        assert!(!request.clear);
        assert!(request.value.is_none());
        assert!(request.metadata.is_empty());
    }
}
