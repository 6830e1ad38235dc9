//! Peer discovery and connection tracking.
//!
//! Two views are kept apart: the *known* set holds dialable addresses
//! (bootstrap peers, addresses learned from `PEERS` and `STATUS`), while the
//! *connection* table holds live links keyed by connection id, together with
//! what each peer told us in its `STATUS`.

use std::collections::{BTreeSet, HashMap};

use rota_messages::Status;
use rota_types::BlockHash;

/// Per-connection metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerState {
    /// Connection id (the remote socket address).
    pub id: String,
    /// Address we dialed, for outbound connections.
    pub dial_addr: Option<String>,
    /// Set once the peer's STATUS was accepted.
    pub node_id: Option<String>,
    /// Address the peer advertises for itself.
    pub public_addr: Option<String>,
    /// Advertised chain length.
    pub height: u64,
    pub last_hash: BlockHash,
}

impl PeerState {
    fn new(id: String, dial_addr: Option<String>) -> Self {
        Self {
            id,
            dial_addr,
            node_id: None,
            public_addr: None,
            height: 0,
            last_hash: BlockHash::ZERO,
        }
    }

    pub fn is_handshaken(&self) -> bool {
        self.node_id.is_some()
    }

    /// Whether this connection reaches `addr`.
    pub fn reaches(&self, addr: &str) -> bool {
        self.dial_addr.as_deref() == Some(addr) || self.public_addr.as_deref() == Some(addr)
    }
}

/// Registry of known addresses and live connections.
pub struct PeerManager {
    known: BTreeSet<String>,
    connections: HashMap<String, PeerState>,
    own_addr: Option<String>,
}

impl PeerManager {
    pub fn new(own_addr: Option<String>) -> Self {
        Self {
            known: BTreeSet::new(),
            connections: HashMap::new(),
            own_addr,
        }
    }

    pub fn own_addr(&self) -> Option<&str> {
        self.own_addr.as_deref()
    }

    // -- Known addresses -------------------------------------------------------

    /// Remember a dialable address. Returns `true` if it is new.
    /// Empty strings and our own address are ignored.
    pub fn add_known(&mut self, addr: &str) -> bool {
        let addr = addr.trim();
        if addr.is_empty() || self.own_addr.as_deref() == Some(addr) {
            return false;
        }
        self.known.insert(addr.to_string())
    }

    /// Stop dialing `addr` (it turned out to be ourselves).
    pub fn forget(&mut self, addr: &str) -> bool {
        self.known.remove(addr)
    }

    pub fn is_known(&self, addr: &str) -> bool {
        self.known.contains(addr)
    }

    /// Known addresses, sorted, for a `PEERS` reply.
    pub fn known_addrs(&self) -> Vec<String> {
        self.known.iter().cloned().collect()
    }

    /// Known addresses with no live connection reaching them.
    pub fn reconnect_candidates(&self) -> Vec<String> {
        self.known
            .iter()
            .filter(|addr| !self.is_reachable_connected(addr))
            .cloned()
            .collect()
    }

    // -- Connections -----------------------------------------------------------

    /// Track a new connection. `dial_addr` is set when we initiated it.
    pub fn register_connection(&mut self, id: &str, dial_addr: Option<String>) {
        self.connections
            .insert(id.to_string(), PeerState::new(id.to_string(), dial_addr));
    }

    /// Record an accepted STATUS. The advertised public address becomes known.
    pub fn apply_status(&mut self, id: &str, status: &Status) -> bool {
        let Some(peer) = self.connections.get_mut(id) else {
            return false;
        };
        peer.node_id = Some(status.node_id.clone());
        peer.public_addr = status.public_addr.clone();
        peer.height = status.height;
        peer.last_hash = status.last_hash;
        if let Some(addr) = status.public_addr.as_deref() {
            self.add_known(addr);
        }
        true
    }

    /// A peer gossiped a block we accepted: its chain is at least that long.
    pub fn update_tip(&mut self, id: &str, height: u64, hash: BlockHash) {
        if let Some(peer) = self.connections.get_mut(id) {
            if height >= peer.height {
                peer.height = height;
                peer.last_hash = hash;
            }
        }
    }

    pub fn mark_disconnected(&mut self, id: &str) -> Option<PeerState> {
        self.connections.remove(id)
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    /// Whether some live connection already reaches `addr`.
    pub fn is_reachable_connected(&self, addr: &str) -> bool {
        self.connections.values().any(|p| p.reaches(addr))
    }

    pub fn peer(&self, id: &str) -> Option<&PeerState> {
        self.connections.get(id)
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    /// Handshaken connections.
    pub fn iter_ready(&self) -> impl Iterator<Item = &PeerState> {
        self.connections.values().filter(|p| p.is_handshaken())
    }

    /// Handshaken peer advertising the longest chain above `local_height`.
    /// Ties go to the smallest connection id.
    pub fn best_peer(&self, local_height: u64) -> Option<(String, u64)> {
        self.iter_ready()
            .filter(|p| p.height > local_height)
            .max_by(|a, b| a.height.cmp(&b.height).then_with(|| b.id.cmp(&a.id)))
            .map(|p| (p.id.clone(), p.height))
    }

    /// Connections a gossip message should be relayed to: handshaken peers
    /// except the one it came from and any link back to ourselves.
    pub fn gossip_targets(&self, origin: Option<&str>) -> Vec<String> {
        let own = self.own_addr.as_deref();
        let mut targets: Vec<String> = self
            .iter_ready()
            .filter(|p| Some(p.id.as_str()) != origin)
            .filter(|p| own.map_or(true, |own| !p.reaches(own)))
            .map(|p| p.id.clone())
            .collect();
        targets.sort();
        targets
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
