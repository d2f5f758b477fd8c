use std::collections::{HashMap, hash_map::Entry};

use crate::peer::connection::PeerConnection;

/// Live connections keyed by remote peer id. At most one per peer.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<String, PeerConnection>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection for `peer_id`, building it with `create` if
    /// there is none yet. A failed build leaves the registry unchanged.
    pub async fn get_or_create<F, Fut, E>(
        &mut self,
        peer_id: &str,
        create: F,
    ) -> Result<&mut PeerConnection, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PeerConnection, E>>,
    {
        match self.peers.entry(peer_id.to_owned()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let connection = create().await?;
                Ok(entry.insert(connection))
            }
        }
    }

    /// Stores `connection`, handing back whatever it replaced so the caller
    /// can close it.
    pub fn insert(&mut self, connection: PeerConnection) -> Option<PeerConnection> {
        self.peers.insert(connection.peer_id().to_owned(), connection)
    }

    pub fn get(&self, peer_id: &str) -> Option<&PeerConnection> {
        self.peers.get(peer_id)
    }

    pub fn get_mut(&mut self, peer_id: &str) -> Option<&mut PeerConnection> {
        self.peers.get_mut(peer_id)
    }

    pub fn remove(&mut self, peer_id: &str) -> Option<PeerConnection> {
        self.peers.remove(peer_id)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Peers whose data channel is open, in no particular order.
    pub fn open_peers(&self) -> impl Iterator<Item = &PeerConnection> {
        self.peers.values().filter(|peer| peer.is_open())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn drain(&mut self) -> Vec<PeerConnection> {
        self.peers.drain().map(|(_, peer)| peer).collect()
    }
}
