//! Typed view of the record a key's log replays to, plus the diffs that
//! build it.

use std::collections::BTreeMap;

use arbor_types::{Branch, ContentHash};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::diff::{Diff, DiffMode, DiffOp};
use crate::error::LedgerResult;

/// Field holding the fork marker at the root of a branch.
pub const ORIGIN_FIELD: &str = "origin";

/// What a key holds at some point in time.
///
/// `children` lists the direct child segments that currently exist; the
/// append (`ua`) and remove (`um`) diffs below are the only writers of it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub value: Option<ContentHash>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub branches: BTreeMap<String, Branch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Branch>,
}

impl KeyRecord {
    /// Interpret a replayed value; `None` is the empty record.
    pub fn from_value(value: Option<Value>) -> LedgerResult<Self> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => Ok(serde_json::from_value(value)?),
        }
    }

    /// Write metadata and value in one entry.
    ///
    /// With `clear` the metadata is replaced and the value is written even
    /// when absent (recorded as `null`); otherwise metadata is merged and an
    /// absent value leaves the current one in place.
    pub fn set_diff(
        metadata: Map<String, Value>,
        value: Option<&ContentHash>,
        clear: bool,
    ) -> Diff {
        let metadata_mode = if clear {
            DiffMode::MERGE
        } else {
            DiffMode::MERGE.nested()
        };
        let value_payload = match value {
            Some(hash) => json!({ "value": hash }),
            None if clear => json!({ "value": null }),
            None => json!({}),
        };
        vec![
            DiffOp::new(metadata_mode, json!({ "metadata": metadata })),
            DiffOp::new(DiffMode::MERGE, value_payload),
        ]
    }

    /// Merge changed metadata fields.
    pub fn update_metadata(changes: Map<String, Value>) -> Diff {
        vec![DiffOp::new(DiffMode::MERGE.nested(), json!({ "metadata": changes }))]
    }

    /// Link a child segment.
    pub fn add_child(segment: &str) -> Diff {
        vec![DiffOp::new(DiffMode::APPEND.nested(), json!({ "children": segment }))]
    }

    /// Unlink a child segment.
    pub fn remove_child(segment: &str) -> Diff {
        vec![DiffOp::new(DiffMode::REMOVE.nested(), json!({ "children": segment }))]
    }

    /// Record a branch forked at this key under `name`.
    pub fn add_branch(name: &str, branch: &Branch) -> LedgerResult<Diff> {
        let mut branches = Map::new();
        branches.insert(name.to_string(), serde_json::to_value(branch)?);
        Ok(vec![DiffOp::new(
            DiffMode::MERGE.nested(),
            json!({ "branches": branches }),
        )])
    }

    /// Mark the root of a freshly created branch with its origin.
    pub fn origin_marker(branch: &Branch) -> LedgerResult<Diff> {
        let mut fields = Map::new();
        fields.insert(ORIGIN_FIELD.to_string(), serde_json::to_value(branch)?);
        Ok(vec![DiffOp::new(DiffMode::MERGE, Value::Object(fields))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::apply_diff;
    use arbor_types::{BranchId, Key, Timestamp};

    fn replay(diffs: &[Diff]) -> KeyRecord {
        let mut value = None;
        for diff in diffs {
            value = apply_diff(value, diff).unwrap();
        }
        KeyRecord::from_value(value).unwrap()
    }

    fn meta(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn empty_log_is_default_record() {
        assert_eq!(KeyRecord::from_value(None).unwrap(), KeyRecord::default());
    }

    #[test]
    fn set_merges_metadata_unless_clearing() {
        let hash = ContentHash::parse(&format!("1{}", "a".repeat(43))).unwrap();
        let record = replay(&[
            KeyRecord::set_diff(meta(&[("a", json!(1))]), Some(&hash), false),
            KeyRecord::set_diff(meta(&[("b", json!(2))]), None, false),
        ]);
        assert_eq!(record.metadata, meta(&[("a", json!(1)), ("b", json!(2))]));
        assert_eq!(record.value, Some(hash.clone()));

        let cleared = replay(&[
            KeyRecord::set_diff(meta(&[("a", json!(1))]), Some(&hash), false),
            KeyRecord::set_diff(Map::new(), None, true),
        ]);
        assert!(cleared.metadata.is_empty());
        assert_eq!(cleared.value, None);
    }

    #[test]
    fn children_and_branches() {
        let branch = Branch::fork(
            BranchId::new("b2"),
            BranchId::new("b1"),
            Timestamp::from_secs(5.0).unwrap(),
            Key::from(["docs"]),
        );
        let record = replay(&[
            KeyRecord::add_child("x"),
            KeyRecord::add_child("y"),
            KeyRecord::add_child("x"),
            KeyRecord::remove_child("y"),
            KeyRecord::add_branch("draft", &branch).unwrap(),
        ]);
        assert_eq!(record.children, vec!["x".to_string()]);
        assert_eq!(record.branches.get("draft"), Some(&branch));
    }

    #[test]
    fn origin_marker_round_trips() {
        let branch = Branch::root(BranchId::new("R0"));
        let record = replay(&[KeyRecord::origin_marker(&branch).unwrap()]);
        assert_eq!(record.origin, Some(branch));
        assert!(record.children.is_empty());
    }
}
