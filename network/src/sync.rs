//! Chain synchronization state machine.
//!
//! The manager is pure: callers feed it events (a peer's advertised height,
//! the outcome of applying a fetched block, a full chain arriving, a
//! disconnect) and it answers with at most one [`SyncAction`] for the
//! connection layer to perform. Only one peer is synced from at a time, and
//! blocks are fetched one by one in increasing index order.
//!
//! Heights are chain lengths, so the next index to fetch is always the local
//! height.
//!
//! Fork recovery fetches the partner's whole chain in pages. Pages are
//! collected here in index order and handed back complete for a rebuild.

use rota_ledger::Block;
use rota_types::Timestamp;

/// How long a sync attempt may go without progress before it is dropped.
pub const STALL_TIMEOUT_MS: u64 = 30_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing { target: u64, peer: String },
}

/// I/O the caller must perform on behalf of the manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncAction {
    RequestBlock { peer: String, index: u64 },
    /// Fetch the next page of the peer's chain, starting at `from`.
    RequestChain { peer: String, from: u64 },
    /// Caught up with everyone: ask all connected peers for their mempools.
    RequestMempools,
}

/// What happened when a fetched block was handed to the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockOutcome {
    Applied,
    /// The block does not link to our tip.
    Fork,
    Rejected,
}

/// What became of one `CHAIN` page.
#[derive(Clone, Debug, PartialEq)]
pub enum ChainPage {
    /// No fetch from this peer is in progress; the page is handed back.
    Ignored(Vec<Block>),
    /// Collected; more pages are needed.
    Next(SyncAction),
    /// The peer's whole chain, ready for a rebuild.
    Complete(Vec<Block>),
    /// The page did not continue the fetch, so the attempt was dropped.
    Abandoned,
}

pub struct SyncManager {
    state: SyncState,
    last_progress: Timestamp,
    /// Pages of the partner's chain collected so far during fork recovery.
    fetched: Option<Vec<Block>>,
}

impl SyncManager {
    pub fn new() -> Self {
        Self {
            state: SyncState::Idle,
            last_progress: Timestamp::EPOCH,
            fetched: None,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn is_syncing(&self) -> bool {
        matches!(self.state, SyncState::Syncing { .. })
    }

    /// Peer we are currently syncing from.
    pub fn partner(&self) -> Option<&str> {
        match &self.state {
            SyncState::Syncing { peer, .. } => Some(peer),
            SyncState::Idle => None,
        }
    }

    /// Whether a paged chain fetch is in progress.
    pub fn is_fetching_chain(&self) -> bool {
        self.fetched.is_some()
    }

    fn is_partner(&self, peer: &str) -> bool {
        self.partner() == Some(peer)
    }

    fn start(&mut self, peer: &str, target: u64, local_height: u64, now: Timestamp) -> SyncAction {
        tracing::info!(peer = %peer, from = local_height, target, "starting chain sync");
        self.state = SyncState::Syncing {
            target,
            peer: peer.to_string(),
        };
        self.last_progress = now;
        SyncAction::RequestBlock {
            peer: peer.to_string(),
            index: local_height,
        }
    }

    fn stop(&mut self, reason: &'static str) {
        if let SyncState::Syncing { peer, target } = &self.state {
            tracing::info!(peer = %peer, target, reason, "chain sync stopped");
        }
        self.state = SyncState::Idle;
        self.fetched = None;
    }

    /// The current attempt finished. Re-enter sync if some peer is still
    /// ahead, otherwise fall back to mempool reconciliation.
    fn complete(&mut self, local_height: u64, best_peer: Option<(String, u64)>, now: Timestamp) -> SyncAction {
        self.stop("target reached");
        match best_peer {
            Some((peer, height)) if height > local_height => self.start(&peer, height, local_height, now),
            _ => SyncAction::RequestMempools,
        }
    }

    /// A peer advertised its chain height during the handshake.
    pub fn on_peer_status(
        &mut self,
        peer: &str,
        peer_height: u64,
        local_height: u64,
        now: Timestamp,
    ) -> Option<SyncAction> {
        if self.is_syncing() || peer_height <= local_height {
            return None;
        }
        Some(self.start(peer, peer_height, local_height, now))
    }

    /// A `BLOCK_RESPONSE` from `peer` was processed. `outcome` is `None` when
    /// the peer had no block at the requested index. `local_height` is the
    /// chain length after processing; `best_peer` is the connected peer with
    /// the longest advertised chain.
    pub fn on_block(
        &mut self,
        peer: &str,
        outcome: Option<BlockOutcome>,
        local_height: u64,
        best_peer: Option<(String, u64)>,
        now: Timestamp,
    ) -> Option<SyncAction> {
        let SyncState::Syncing { target, .. } = self.state else {
            return None;
        };
        if !self.is_partner(peer) {
            return None;
        }

        match outcome {
            None => {
                self.stop("peer has no block at requested index");
                None
            }
            Some(BlockOutcome::Rejected) => {
                self.stop("block rejected");
                None
            }
            Some(BlockOutcome::Fork) => {
                self.last_progress = now;
                self.fetched = Some(Vec::new());
                tracing::warn!(peer = %peer, height = local_height, "fork detected, fetching peer chain");
                Some(SyncAction::RequestChain {
                    peer: peer.to_string(),
                    from: 0,
                })
            }
            Some(BlockOutcome::Applied) => {
                self.last_progress = now;
                if local_height >= target {
                    Some(self.complete(local_height, best_peer, now))
                } else {
                    Some(SyncAction::RequestBlock {
                        peer: peer.to_string(),
                        index: local_height,
                    })
                }
            }
        }
    }

    /// A `CHAIN` page arrived from `peer`. Pages must arrive in order and
    /// be non-empty until `height` blocks have been collected.
    pub fn on_chain_page(
        &mut self,
        peer: &str,
        from: u64,
        height: u64,
        blocks: Vec<Block>,
        now: Timestamp,
    ) -> ChainPage {
        let expected = match &self.fetched {
            Some(fetched) if self.is_partner(peer) => fetched.len() as u64,
            _ => return ChainPage::Ignored(blocks),
        };
        if from != expected || blocks.is_empty() {
            tracing::warn!(peer = %peer, from, expected, "unexpected chain page");
            self.stop("chain fetch broken off");
            return ChainPage::Abandoned;
        }

        let Some(fetched) = self.fetched.as_mut() else {
            return ChainPage::Abandoned;
        };
        fetched.extend(blocks);
        let received = fetched.len() as u64;
        self.last_progress = now;
        if received >= height {
            ChainPage::Complete(self.fetched.take().unwrap_or_default())
        } else {
            tracing::debug!(peer = %peer, received, height, "chain page collected");
            ChainPage::Next(SyncAction::RequestChain {
                peer: peer.to_string(),
                from: received,
            })
        }
    }

    /// A complete chain from `peer` was processed (adopted or not).
    pub fn on_chain(
        &mut self,
        peer: &str,
        local_height: u64,
        best_peer: Option<(String, u64)>,
        now: Timestamp,
    ) -> Option<SyncAction> {
        if !self.is_partner(peer) {
            return None;
        }
        Some(self.complete(local_height, best_peer, now))
    }

    /// Returns `true` if the sync partner went away.
    pub fn on_disconnect(&mut self, peer: &str) -> bool {
        if self.is_partner(peer) {
            self.stop("sync partner disconnected");
            true
        } else {
            false
        }
    }

    /// Drop an attempt that made no progress for [`STALL_TIMEOUT_MS`].
    pub fn expire_stalled(&mut self, now: Timestamp) -> bool {
        if self.is_syncing() && self.last_progress.elapsed_since(now) > STALL_TIMEOUT_MS {
            self.stop("stalled");
            true
        } else {
            false
        }
    }
}

impl Default for SyncManager {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rota_types::ChainParams;

    fn t(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn request(peer: &str, index: u64) -> Option<SyncAction> {
        Some(SyncAction::RequestBlock {
            peer: peer.into(),
            index,
        })
    }

    #[test]
    fn taller_peer_starts_sync_from_local_height() {
        let mut sync = SyncManager::new();
        assert_eq!(sync.on_peer_status("a", 10, 3, t(0)), request("a", 3));
        assert_eq!(
            sync.state(),
            &SyncState::Syncing {
                target: 10,
                peer: "a".into()
            }
        );
    }

    #[test]
    fn shorter_or_equal_peer_is_ignored() {
        let mut sync = SyncManager::new();
        assert_eq!(sync.on_peer_status("a", 3, 3, t(0)), None);
        assert_eq!(sync.on_peer_status("a", 2, 3, t(0)), None);
        assert!(!sync.is_syncing());
    }

    #[test]
    fn one_partner_at_a_time() {
        let mut sync = SyncManager::new();
        sync.on_peer_status("a", 10, 3, t(0));
        assert_eq!(sync.on_peer_status("b", 20, 3, t(0)), None);
        assert_eq!(sync.partner(), Some("a"));
    }

    #[test]
    fn walks_to_target_then_reconciles_mempools() {
        let mut sync = SyncManager::new();
        let mut next = sync.on_peer_status("a", 10, 3, t(0));
        let mut local = 3;
        while let Some(SyncAction::RequestBlock { peer, index }) = next {
            assert_eq!(index, local);
            local += 1;
            next = sync.on_block(&peer, Some(BlockOutcome::Applied), local, Some(("a".into(), 10)), t(local));
        }
        assert_eq!(local, 10);
        assert_eq!(next, Some(SyncAction::RequestMempools));
        assert!(!sync.is_syncing());
    }

    #[test]
    fn reaching_target_rechecks_other_peers() {
        let mut sync = SyncManager::new();
        sync.on_peer_status("a", 5, 4, t(0));
        let next = sync.on_block("a", Some(BlockOutcome::Applied), 5, Some(("b".into(), 8)), t(1));
        assert_eq!(next, request("b", 5));
        assert_eq!(sync.partner(), Some("b"));
    }

    fn blocks(count: usize) -> Vec<Block> {
        let genesis = Block::genesis(&ChainParams::default());
        vec![genesis; count]
    }

    fn fetch_page(peer: &str, from: u64) -> ChainPage {
        ChainPage::Next(SyncAction::RequestChain {
            peer: peer.into(),
            from,
        })
    }

    #[test]
    fn fork_fetches_chain_in_pages_then_completes() {
        let mut sync = SyncManager::new();
        sync.on_peer_status("a", 10, 3, t(0));
        assert_eq!(
            sync.on_block("a", Some(BlockOutcome::Fork), 3, None, t(1)),
            Some(SyncAction::RequestChain {
                peer: "a".into(),
                from: 0
            })
        );
        assert!(sync.is_fetching_chain());

        assert_eq!(sync.on_chain_page("a", 0, 10, blocks(4), t(2)), fetch_page("a", 4));
        assert_eq!(sync.on_chain_page("a", 4, 10, blocks(4), t(3)), fetch_page("a", 8));
        assert_eq!(sync.on_chain_page("a", 8, 10, blocks(2), t(4)), ChainPage::Complete(blocks(10)));
        assert!(!sync.is_fetching_chain());
        assert!(sync.is_syncing());

        assert_eq!(sync.on_chain("a", 10, None, t(5)), Some(SyncAction::RequestMempools));
        assert!(!sync.is_syncing());
    }

    #[test]
    fn chain_that_grew_mid_fetch_is_collected_to_its_new_height() {
        let mut sync = SyncManager::new();
        sync.on_peer_status("a", 4, 3, t(0));
        sync.on_block("a", Some(BlockOutcome::Fork), 3, None, t(1));
        assert_eq!(sync.on_chain_page("a", 0, 4, blocks(2), t(2)), fetch_page("a", 2));
        assert_eq!(sync.on_chain_page("a", 2, 5, blocks(2), t(3)), fetch_page("a", 4));
        assert_eq!(sync.on_chain_page("a", 4, 5, blocks(1), t(4)), ChainPage::Complete(blocks(5)));
    }

    #[test]
    fn out_of_order_or_empty_page_abandons_fetch() {
        let mut sync = SyncManager::new();
        sync.on_peer_status("a", 10, 3, t(0));
        sync.on_block("a", Some(BlockOutcome::Fork), 3, None, t(1));
        sync.on_chain_page("a", 0, 10, blocks(4), t(2));
        assert_eq!(sync.on_chain_page("a", 6, 10, blocks(4), t(3)), ChainPage::Abandoned);
        assert!(!sync.is_syncing());
        assert!(!sync.is_fetching_chain());

        sync.on_peer_status("a", 10, 3, t(4));
        sync.on_block("a", Some(BlockOutcome::Fork), 3, None, t(5));
        assert_eq!(sync.on_chain_page("a", 0, 10, Vec::new(), t(6)), ChainPage::Abandoned);
        assert!(!sync.is_syncing());
    }

    #[test]
    fn pages_outside_a_fetch_are_handed_back() {
        let mut sync = SyncManager::new();
        assert_eq!(sync.on_chain_page("a", 0, 2, blocks(2), t(0)), ChainPage::Ignored(blocks(2)));

        sync.on_peer_status("a", 10, 3, t(0));
        sync.on_block("a", Some(BlockOutcome::Fork), 3, None, t(1));
        assert_eq!(sync.on_chain_page("b", 0, 2, blocks(2), t(2)), ChainPage::Ignored(blocks(2)));
        assert!(sync.is_fetching_chain());
    }

    #[test]
    fn disconnect_discards_collected_pages() {
        let mut sync = SyncManager::new();
        sync.on_peer_status("a", 10, 3, t(0));
        sync.on_block("a", Some(BlockOutcome::Fork), 3, None, t(1));
        sync.on_chain_page("a", 0, 10, blocks(4), t(2));
        assert!(sync.on_disconnect("a"));
        assert!(!sync.is_fetching_chain());
    }

    #[test]
    fn rejection_or_missing_block_abandons() {
        let mut sync = SyncManager::new();
        sync.on_peer_status("a", 10, 3, t(0));
        assert_eq!(sync.on_block("a", Some(BlockOutcome::Rejected), 3, None, t(1)), None);
        assert!(!sync.is_syncing());

        sync.on_peer_status("a", 10, 3, t(2));
        assert_eq!(sync.on_block("a", None, 3, None, t(3)), None);
        assert!(!sync.is_syncing());
    }

    #[test]
    fn responses_from_strangers_are_ignored() {
        let mut sync = SyncManager::new();
        sync.on_peer_status("a", 10, 3, t(0));
        assert_eq!(sync.on_block("b", Some(BlockOutcome::Applied), 4, None, t(1)), None);
        assert_eq!(sync.on_chain("b", 4, None, t(1)), None);
        assert_eq!(sync.partner(), Some("a"));
    }

    #[test]
    fn partner_disconnect_returns_to_idle() {
        let mut sync = SyncManager::new();
        sync.on_peer_status("a", 10, 3, t(0));
        assert!(!sync.on_disconnect("b"));
        assert!(sync.on_disconnect("a"));
        assert_eq!(sync.state(), &SyncState::Idle);
    }

    #[test]
    fn stalled_sync_expires() {
        let mut sync = SyncManager::new();
        sync.on_peer_status("a", 10, 3, t(1_000));
        assert!(!sync.expire_stalled(t(1_000 + STALL_TIMEOUT_MS)));
        assert!(sync.expire_stalled(t(1_001 + STALL_TIMEOUT_MS)));
        assert!(!sync.is_syncing());
    }
}
