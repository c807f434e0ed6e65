//! Branch records and branch specifiers.
//!
//! A root branch has no origin. A forked branch copies the subtree at
//! `origin_key` of `origin_id` as it was at `origin_timestamp`; until a key is
//! written locally, reads fall through to the origin.

use serde::{Deserialize, Serialize};

use crate::identity::BranchId;
use crate::key::Key;
use crate::temporal::Timestamp;

/// A branch record, stored under the `branches` field of its fork point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub branch_id: BranchId,
    /// The branch this one was forked from.
    pub origin_id: Option<BranchId>,
    /// Reads falling through to the origin never see past this instant.
    pub origin_timestamp: Option<Timestamp>,
    /// Subtree of the origin that became this branch's root.
    pub origin_key: Option<Key>,
}

impl Branch {
    /// A root branch with no origin.
    pub fn root(branch_id: BranchId) -> Self {
        Self {
            branch_id,
            origin_id: None,
            origin_timestamp: None,
            origin_key: None,
        }
    }

    /// A branch forked from `origin` at `key` and `timestamp`.
    pub fn fork(branch_id: BranchId, origin: BranchId, timestamp: Timestamp, key: Key) -> Self {
        Self {
            branch_id,
            origin_id: Some(origin),
            origin_timestamp: Some(timestamp),
            origin_key: Some(key),
        }
    }

    /// Returns `true` if reads may fall through to an origin branch.
    pub fn is_fork(&self) -> bool {
        self.origin_id.is_some()
    }
}

/// How a caller names the branch an operation runs against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchSpec {
    /// The node's default branch.
    Default,
    /// A branch the node already knows by id.
    Id(BranchId),
    /// A branch forked at `key` (on the default branch) under `name`.
    Named { key: Key, name: String },
    /// A fully resolved record, as passed between peers.
    Record(Branch),
}

impl From<BranchId> for BranchSpec {
    fn from(id: BranchId) -> Self {
        Self::Id(id)
    }
}

impl From<Branch> for BranchSpec {
    fn from(branch: Branch) -> Self {
        Self::Record(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_branch_has_no_origin() {
        let branch = Branch::root(BranchId::new("R0"));
        assert!(!branch.is_fork());
        assert!(branch.origin_key.is_none());
    }

    #[test]
    fn fork_records_origin() {
        let ts = Timestamp::from_secs(10.0).unwrap();
        let branch = Branch::fork(
            BranchId::new("b2"),
            BranchId::new("b1"),
            ts,
            Key::from(["docs"]),
        );
        assert!(branch.is_fork());
        assert_eq!(branch.origin_id, Some(BranchId::new("b1")));
        assert_eq!(branch.origin_timestamp, Some(ts));
    }

    #[test]
    fn serde_field_names() {
        let branch = Branch::root(BranchId::new("R0"));
        let json = serde_json::to_value(&branch).unwrap();
        assert_eq!(json["branch_id"], "R0");
        assert!(json["origin_id"].is_null());
        let parsed: Branch = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, branch);
    }
}
