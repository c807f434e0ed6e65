use std::fmt;

use arbor_types::PeerId;
use serde::{Deserialize, Serialize};

/// A registry entry.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// The named peer answers for this subtree.
    Peer(PeerId),
    /// A cached owner went stale; resolve through the ancestors instead.
    Unknown,
}

impl Owner {
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            Self::Peer(id) => Some(id),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Peer(_))
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Peer(id) => write!(f, "Owner({id})"),
            Self::Unknown => write!(f, "Owner(?)"),
        }
    }
}

impl From<PeerId> for Owner {
    fn from(id: PeerId) -> Self {
        Self::Peer(id)
    }
}

/// Result of resolving a key: the owning peer and how much of the key the
/// matching entry covered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub owner: PeerId,
    /// Length of the registered prefix that matched.
    pub prefix_len: usize,
}

impl Resolution {
    /// Returns `true` if the entry was for the full key, not an ancestor.
    pub fn is_exact(&self, key_len: usize) -> bool {
        self.prefix_len == key_len
    }
}
