//! Flood-based message broadcasting.
//!
//! The [`Broadcaster`] does not write directly to TCP streams. Instead it
//! pushes `(peer_id, frame)` tuples onto an `mpsc` channel that the
//! connection layer drains.

use tokio::sync::mpsc;

/// Outcome of a broadcast attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Number of peers the frame was queued for.
    pub sent: usize,
    /// Number of peers for which queueing failed (channel full / closed).
    pub failed: usize,
}

/// Queue-based broadcaster.
#[derive(Clone)]
pub struct Broadcaster {
    outbound_tx: mpsc::Sender<(String, Vec<u8>)>,
}

impl Broadcaster {
    pub fn new(outbound_tx: mpsc::Sender<(String, Vec<u8>)>) -> Self {
        Self { outbound_tx }
    }

    /// Queue `frame` for a single peer. Returns `false` if the queue is
    /// full or closed.
    pub fn send_to(&self, peer_id: &str, frame: &[u8]) -> bool {
        match self.outbound_tx.try_send((peer_id.to_string(), frame.to_vec())) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(peer = %peer_id, error = %e, "dropping outbound frame");
                false
            }
        }
    }

    /// Queue `frame` for every peer in `targets`.
    ///
    /// Callers pick the targets (see `PeerManager::gossip_targets`), so the
    /// origin of a relayed message and links to ourselves are already gone.
    pub fn broadcast<S: AsRef<str>>(&self, frame: &[u8], targets: &[S]) -> BroadcastResult {
        let mut result = BroadcastResult::default();
        for peer in targets {
            if self.send_to(peer.as_ref(), frame) {
                result.sent += 1;
            } else {
                result.failed += 1;
            }
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
