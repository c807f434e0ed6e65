use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use arbor_sync::Peer;
use arbor_types::{PeerId, SessionIdentity};

/// The peers a node knows, by node id.
///
/// The node itself is not listed.
#[derive(Default)]
pub struct PeerDirectory {
    peers: RwLock<BTreeMap<PeerId, Arc<dyn Peer>>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, peer: Arc<dyn Peer>) {
        let mut peers = self.peers.write().expect("lock poisoned");
        peers.insert(peer.id().clone(), peer);
    }

    pub fn get(&self, id: &PeerId) -> Option<Arc<dyn Peer>> {
        self.peers.read().expect("lock poisoned").get(id).cloned()
    }

    pub fn remove(&self, id: &PeerId) -> Option<Arc<dyn Peer>> {
        self.peers.write().expect("lock poisoned").remove(id)
    }

    /// The known peer running under `session`.
    pub fn find_by_session(&self, session: &SessionIdentity) -> Option<PeerId> {
        let peers = self.peers.read().expect("lock poisoned");
        peers
            .iter()
            .find(|(_, peer)| peer.session() == session)
            .map(|(id, _)| id.clone())
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.read().expect("lock poisoned").keys().cloned().collect()
    }

    /// Snapshot of every handle, so callers never hold the lock across a call.
    pub fn handles(&self) -> Vec<Arc<dyn Peer>> {
        self.peers.read().expect("lock poisoned").values().cloned().collect()
    }

    pub fn drain(&self) -> Vec<Arc<dyn Peer>> {
        let mut peers = self.peers.write().expect("lock poisoned");
        std::mem::take(&mut *peers).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
