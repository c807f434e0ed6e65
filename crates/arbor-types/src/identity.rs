use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a node in the peer network.
///
/// Formed as `region + instance_id`, so nodes sharing a session key are told
/// apart by their instance suffix.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Compose a node id from its region prefix and session instance.
    pub fn from_parts(region: &str, instance_id: &str) -> Self {
        Self(format!("{region}{instance_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a branch (an independently versioned line of history).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(String);

impl BranchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BranchId({})", self.0)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BranchId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Authenticated identity of a session, as vouched for by the transport.
///
/// Nodes of one deployment share a `public_key` and differ by
/// `instance_id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub public_key: String,
    pub instance_id: String,
}

impl SessionIdentity {
    pub fn new(public_key: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            instance_id: instance_id.into(),
        }
    }

    /// Returns `true` if both sessions were issued under the same key.
    pub fn same_key(&self, other: &SessionIdentity) -> bool {
        self.public_key == other.public_key
    }
}
