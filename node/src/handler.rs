//! Inbound message dispatch.
//!
//! Every connection's read loop hands decoded messages to one shared
//! [`MessageHandler`], which routes them to the chain, the peer manager, and
//! the sync state machine, and queues replies and relays through the
//! [`Broadcaster`].
//!
//! Lock order is chain, then sync, then peers. The peer manager lock is only
//! ever held for a single statement.
//!
//! Chains are served in pages of at most [`CHAIN_PAGE_BLOCKS`] blocks, fewer
//! if that many would not fit in one frame.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};

use rota_crypto::validate_address;
use rota_ledger::{AdmissionError, AdmissionStatus, Block, BlockReceipt, Chain, ChainError};
use rota_messages::{Message, Status};
use rota_network::{
    BlockOutcome, BroadcastResult, Broadcaster, ChainPage, PeerManager, SyncAction, SyncManager, SyncState,
};
use rota_protocol::{check_status, encode, ProtocolError};
use rota_transactions::Transaction;
use rota_types::{Address, Clock};

/// Most blocks served in one `CHAIN` page.
pub const CHAIN_PAGE_BLOCKS: usize = 256;

/// What the read loop should do with the connection after a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Disconnect,
}

pub struct MessageHandler {
    chain: Arc<Mutex<Chain>>,
    peers: Arc<RwLock<PeerManager>>,
    sync: Mutex<SyncManager>,
    broadcaster: Broadcaster,
    clock: Arc<dyn Clock>,
    node_id: String,
    dial_tx: mpsc::Sender<String>,
}

impl MessageHandler {
    pub fn new(
        chain: Arc<Mutex<Chain>>,
        peers: Arc<RwLock<PeerManager>>,
        broadcaster: Broadcaster,
        clock: Arc<dyn Clock>,
        node_id: String,
        dial_tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            chain,
            peers,
            sync: Mutex::new(SyncManager::new()),
            broadcaster,
            clock,
            node_id,
            dial_tx,
        }
    }

    pub fn chain(&self) -> &Arc<Mutex<Chain>> {
        &self.chain
    }

    pub fn peers(&self) -> &Arc<RwLock<PeerManager>> {
        &self.peers
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub async fn sync_state(&self) -> SyncState {
        self.sync.lock().await.state().clone()
    }

    pub async fn is_syncing(&self) -> bool {
        self.sync.lock().await.is_syncing()
    }

    // ── Outbound helpers ────────────────────────────────────────────────

    fn send(&self, peer_id: &str, message: &Message) -> bool {
        match encode(message) {
            Ok(frame) => self.broadcaster.send_to(peer_id, &frame),
            Err(e) => {
                tracing::error!(kind = message.kind(), error = %e, "failed to encode message");
                false
            }
        }
    }

    fn gossip(&self, message: &Message, targets: &[String]) -> BroadcastResult {
        match encode(message) {
            Ok(frame) => self.broadcaster.broadcast(&frame, targets),
            Err(e) => {
                tracing::error!(kind = message.kind(), error = %e, "failed to encode message");
                BroadcastResult {
                    sent: 0,
                    failed: targets.len(),
                }
            }
        }
    }

    /// Relay to every handshaken peer except `origin`.
    async fn relay(&self, message: &Message, origin: Option<&str>) -> BroadcastResult {
        let targets = self.peers.read().await.gossip_targets(origin);
        self.gossip(message, &targets)
    }

    fn status_of(&self, chain: &Chain) -> Status {
        Status {
            node_id: self.node_id.clone(),
            public_addr: None,
            height: chain.height(),
            last_hash: chain.tip().hash,
        }
    }

    async fn perform(&self, action: SyncAction) {
        match action {
            SyncAction::RequestBlock { peer, index } => {
                tracing::debug!(peer = %peer, index, "requesting block");
                self.send(&peer, &Message::RequestBlock { index });
            }
            SyncAction::RequestChain { peer, from } => {
                tracing::debug!(peer = %peer, from, "requesting chain page");
                self.send(&peer, &Message::RequestChain { from });
            }
            SyncAction::RequestMempools => {
                let result = self.relay(&Message::GetMempool, None).await;
                tracing::debug!(peers = result.sent, "requesting mempools");
            }
        }
    }

    /// Start syncing from the tallest connected peer, if any is ahead.
    async fn resume_sync(&self, chain: &Chain, sync: &mut SyncManager) {
        let height = chain.height();
        let best = self.peers.read().await.best_peer(height);
        if let Some((peer, peer_height)) = best {
            if let Some(action) = sync.on_peer_status(&peer, peer_height, height, self.clock.now()) {
                self.perform(action).await;
            }
        }
    }

    // ── Connection lifecycle ────────────────────────────────────────────

    /// A connection was established: track it and introduce ourselves.
    pub async fn on_connected(&self, peer_id: &str, dial_addr: Option<String>) {
        self.peers.write().await.register_connection(peer_id, dial_addr);
        let mut status = {
            let chain = self.chain.lock().await;
            self.status_of(&chain)
        };
        status.public_addr = self.peers.read().await.own_addr().map(str::to_string);
        self.send(peer_id, &Message::Status(status));
    }

    pub async fn on_disconnected(&self, peer_id: &str) {
        let chain = self.chain.lock().await;
        let mut sync = self.sync.lock().await;
        self.peers.write().await.mark_disconnected(peer_id);
        if sync.on_disconnect(peer_id) {
            self.resume_sync(&chain, &mut sync).await;
        }
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    pub async fn handle(&self, peer_id: &str, message: Message) -> Disposition {
        tracing::trace!(peer = %peer_id, kind = message.kind(), "message received");
        match message {
            Message::Status(status) => return self.on_status(peer_id, status).await,
            Message::RequestChain { from } => self.serve_chain(peer_id, from).await,
            Message::Chain { from, height, blocks } => self.on_chain(peer_id, from, height, blocks).await,
            Message::RequestBlock { index } => {
                let block = self.chain.lock().await.block(index).cloned();
                self.send(peer_id, &Message::BlockResponse { block });
            }
            Message::BlockResponse { block } => self.on_block_response(peer_id, block).await,
            Message::GetMempool => {
                let txs = self.chain.lock().await.mempool().sorted();
                self.send(peer_id, &Message::Mempool { txs });
            }
            Message::Mempool { txs } => self.on_mempool(peer_id, txs).await,
            Message::Transaction { tx } => self.on_transaction(peer_id, tx).await,
            Message::Block { block } => self.on_block(peer_id, block).await,
            Message::Announce { address } => self.on_announce(peer_id, address).await,
            Message::Peers { addrs } => self.on_peers(addrs).await,
        }
        Disposition::Keep
    }

    async fn on_status(&self, peer_id: &str, status: Status) -> Disposition {
        if let Err(e) = check_status(&self.node_id, &status) {
            match e {
                ProtocolError::SelfConnection => {
                    let mut peers = self.peers.write().await;
                    if let Some(addr) = peers.peer(peer_id).and_then(|p| p.dial_addr.clone()) {
                        peers.forget(&addr);
                    }
                    tracing::info!(peer = %peer_id, "connected to ourselves, dropping link");
                }
                e => {
                    tracing::warn!(peer = %peer_id, error = %e, "handshake rejected");
                }
            }
            return Disposition::Disconnect;
        }

        let mut chain = self.chain.lock().await;
        let mut sync = self.sync.lock().await;

        let (learned, known) = {
            let mut peers = self.peers.write().await;
            peers.apply_status(peer_id, &status);
            let learned = status
                .public_addr
                .clone()
                .filter(|addr| peers.is_known(addr));
            (learned, peers.known_addrs())
        };
        if let Some(addr) = learned {
            chain.add_peer(&addr);
        }

        tracing::info!(
            peer = %peer_id,
            node_id = %status.node_id,
            height = status.height,
            tip = %status.last_hash.short(),
            "peer handshake complete"
        );
        self.send(peer_id, &Message::Peers { addrs: known });

        if let Some(action) = sync.on_peer_status(peer_id, status.height, chain.height(), self.clock.now()) {
            self.perform(action).await;
        }
        Disposition::Keep
    }

    async fn on_block_response(&self, peer_id: &str, block: Option<Block>) {
        let mut chain = self.chain.lock().await;
        let mut sync = self.sync.lock().await;
        if sync.partner() != Some(peer_id) {
            tracing::debug!(peer = %peer_id, "ignoring unsolicited block response");
            return;
        }

        let outcome = block.map(|block| match chain.add_block(block) {
            Ok(_) => BlockOutcome::Applied,
            Err(e) if e.is_fork() => BlockOutcome::Fork,
            Err(e) => {
                tracing::warn!(peer = %peer_id, error = %e, "synced block rejected");
                BlockOutcome::Rejected
            }
        });

        let height = chain.height();
        let best = self.peers.read().await.best_peer(height);
        if let Some(action) = sync.on_block(peer_id, outcome, height, best, self.clock.now()) {
            self.perform(action).await;
        }
    }

    async fn serve_chain(&self, peer_id: &str, from: u64) {
        let page = {
            let chain = self.chain.lock().await;
            encode_chain_page(chain.blocks(), from, CHAIN_PAGE_BLOCKS)
        };
        match page {
            Ok((frame, count)) => {
                tracing::trace!(peer = %peer_id, from, count, "serving chain page");
                self.broadcaster.send_to(peer_id, &frame);
            }
            Err(e) => {
                tracing::error!(peer = %peer_id, from, error = %e, "failed to encode chain page");
            }
        }
    }

    async fn on_chain(&self, peer_id: &str, from: u64, height: u64, blocks: Vec<Block>) {
        let mut chain = self.chain.lock().await;
        let mut sync = self.sync.lock().await;

        let blocks = match sync.on_chain_page(peer_id, from, height, blocks, self.clock.now()) {
            ChainPage::Next(action) => {
                self.perform(action).await;
                return;
            }
            ChainPage::Abandoned => return,
            ChainPage::Complete(blocks) => blocks,
            ChainPage::Ignored(blocks) if from == 0 && blocks.len() as u64 >= height => blocks,
            ChainPage::Ignored(blocks) => {
                tracing::debug!(peer = %peer_id, from, offered = blocks.len(), "ignoring unsolicited chain page");
                return;
            }
        };

        self.adopt_chain(&mut chain, peer_id, blocks).await;

        let height = chain.height();
        let best = self.peers.read().await.best_peer(height);
        if let Some(action) = sync.on_chain(peer_id, height, best, self.clock.now()) {
            self.perform(action).await;
        }
    }

    /// Replace the local chain with a longer one and pass the new tip on, so
    /// peers still on the abandoned branch catch up from us.
    async fn adopt_chain(&self, chain: &mut Chain, peer_id: &str, blocks: Vec<Block>) {
        let offered = blocks.len() as u64;
        if offered <= chain.height() {
            tracing::debug!(peer = %peer_id, offered, local = chain.height(), "received chain is not longer, ignoring");
            return;
        }
        match chain.rebuild_from(blocks) {
            Ok(receipt) => {
                self.peers
                    .write()
                    .await
                    .update_tip(peer_id, receipt.index + 1, receipt.hash);
                if receipt.durable {
                    let block = chain.tip().clone();
                    let result = self.relay(&Message::Block { block }, Some(peer_id)).await;
                    tracing::debug!(index = receipt.index, peers = result.sent, "relayed adopted tip");
                } else {
                    tracing::warn!(index = receipt.index, "rebuilt chain not persisted, not relaying tip");
                }
            }
            Err(e) => {
                tracing::warn!(peer = %peer_id, error = %e, "replacement chain rejected");
            }
        }
    }

    async fn on_mempool(&self, peer_id: &str, mut txs: Vec<Transaction>) {
        txs.sort_by_key(|tx| tx.nonce);
        let offered = txs.len();
        let mut chain = self.chain.lock().await;
        let accepted = txs
            .into_iter()
            .filter(|tx| matches!(chain.add_transaction(tx.clone()), Ok(AdmissionStatus::Accepted)))
            .count();
        tracing::debug!(peer = %peer_id, offered, accepted, "mempool reconciled");
    }

    async fn on_transaction(&self, peer_id: &str, tx: Transaction) {
        let mut chain = self.chain.lock().await;
        if self.sync.lock().await.is_syncing() {
            tracing::trace!(peer = %peer_id, "syncing, ignoring gossiped transaction");
            return;
        }
        match chain.add_transaction(tx.clone()) {
            Ok(AdmissionStatus::Accepted) => {
                drop(chain);
                self.relay(&Message::Transaction { tx }, Some(peer_id)).await;
            }
            Ok(AdmissionStatus::Skipped) => {}
            Err(e) => {
                tracing::debug!(peer = %peer_id, error = %e, "gossiped transaction rejected");
            }
        }
    }

    async fn on_block(&self, peer_id: &str, block: Block) {
        let mut chain = self.chain.lock().await;
        let mut sync = self.sync.lock().await;
        if sync.is_syncing() {
            tracing::trace!(peer = %peer_id, "syncing, ignoring gossiped block");
            return;
        }

        let (index, hash) = (block.index, block.hash);
        match chain.add_block(block.clone()) {
            Ok(receipt) => {
                self.peers
                    .write()
                    .await
                    .update_tip(peer_id, receipt.index + 1, receipt.hash);
                if receipt.durable {
                    drop(sync);
                    drop(chain);
                    self.relay(&Message::Block { block }, Some(peer_id)).await;
                } else {
                    tracing::warn!(index, "block applied but not persisted, not relaying");
                }
            }
            Err(e) if is_ahead(&e) || e.is_fork() => {
                // The peer is ahead of us or on another branch: catch up from it.
                self.peers.write().await.update_tip(peer_id, index + 1, hash);
                if let Some(action) = sync.on_peer_status(peer_id, index + 1, chain.height(), self.clock.now()) {
                    self.perform(action).await;
                }
            }
            Err(e) => {
                tracing::debug!(peer = %peer_id, index, error = %e, "gossiped block rejected");
            }
        }
    }

    async fn on_announce(&self, peer_id: &str, address: Address) {
        if !validate_address(&address) {
            tracing::debug!(peer = %peer_id, address = %address, "ignoring announce with malformed address");
            return;
        }
        tracing::debug!(peer = %peer_id, validator = %address.short(), "validator heartbeat");
        self.chain.lock().await.register_validator(address);
    }

    async fn on_peers(&self, addrs: Vec<String>) {
        let mut chain = self.chain.lock().await;
        let fresh: Vec<String> = {
            let mut peers = self.peers.write().await;
            addrs.into_iter().filter(|addr| peers.add_known(addr)).collect()
        };
        for addr in fresh {
            chain.add_peer(&addr);
            tracing::debug!(addr = %addr, "learned peer address");
            if let Err(e) = self.dial_tx.try_send(addr) {
                tracing::warn!(error = %e, "dial queue full, address will be retried by reconnect");
            }
        }
    }

    // ── Local duties ────────────────────────────────────────────────────

    /// Periodic liveness work: announce our validator (if any) and drop a
    /// stalled sync attempt.
    pub async fn heartbeat(&self, validator: Option<&Address>) {
        let mut chain = self.chain.lock().await;
        if let Some(address) = validator {
            chain.register_validator(address.clone());
            self.relay(
                &Message::Announce {
                    address: address.clone(),
                },
                None,
            )
            .await;
        }
        let mut sync = self.sync.lock().await;
        if sync.expire_stalled(self.clock.now()) {
            self.resume_sync(&chain, &mut sync).await;
        }
    }

    /// Produce a block if `validator` holds the current slot. A block whose
    /// snapshot could not be saved is kept locally but not broadcast.
    pub async fn produce(&self, validator: &Address) -> Option<BlockReceipt> {
        let mut chain = self.chain.lock().await;
        if self.sync.lock().await.is_syncing() {
            tracing::trace!("syncing, skipping block production");
            return None;
        }
        match chain.create_block(validator) {
            Ok(Some(produced)) => {
                drop(chain);
                if produced.receipt.durable {
                    let result = self.relay(&Message::Block { block: produced.block }, None).await;
                    tracing::debug!(index = produced.receipt.index, peers = result.sent, "produced block broadcast");
                } else {
                    tracing::error!(index = produced.receipt.index, "produced block not persisted, withholding broadcast");
                }
                Some(produced.receipt)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!(error = %e, "block production failed");
                None
            }
        }
    }

    /// Admit a locally submitted transaction and gossip it on acceptance.
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<AdmissionStatus, AdmissionError> {
        let status = self.chain.lock().await.add_transaction(tx.clone())?;
        if status == AdmissionStatus::Accepted {
            self.relay(&Message::Transaction { tx }, None).await;
        }
        Ok(status)
    }
}

fn is_ahead(error: &ChainError) -> bool {
    matches!(error, ChainError::IndexMismatch { expected, got } if got > expected)
}

/// Encode the page of `blocks` starting at `from`: up to `max_blocks` of
/// them, halved until the frame fits. Returns the frame and the number of
/// blocks it carries.
pub(crate) fn encode_chain_page(
    blocks: &[Block],
    from: u64,
    max_blocks: usize,
) -> Result<(Vec<u8>, usize), ProtocolError> {
    let height = blocks.len() as u64;
    let start = usize::try_from(from).map_or(blocks.len(), |from| from.min(blocks.len()));
    let mut count = (blocks.len() - start).min(max_blocks.max(1));
    loop {
        let page = Message::Chain {
            from,
            height,
            blocks: blocks[start..start + count].to_vec(),
        };
        match encode(&page) {
            Err(ProtocolError::MessageTooLarge { .. }) if count > 1 => count /= 2,
            result => return result.map(|frame| (frame, count)),
        }
    }
}
