//! The ROTA node: owns the chain, the P2P listener, and the timer tasks.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use rota_crypto::{address_from_public, keypair_from_mnemonic};
use rota_ledger::{AdmissionError, AdmissionStatus, Chain};
use rota_network::{Broadcaster, PeerManager, SyncState};
use rota_protocol::generate_node_id;
use rota_store::SnapshotStore;
use rota_store_lmdb::environment::DEFAULT_MAP_SIZE;
use rota_store_lmdb::LmdbEnvironment;
use rota_transactions::Transaction;
use rota_types::{Address, SystemClock};
use rota_vm::ScriptEngine;

use crate::config::NodeConfig;
use crate::connection_registry::{write_framed, ConnectionRegistry};
use crate::handler::MessageHandler;
use crate::peer_connector::{attach_connection, connect_to_peer, is_peer_connected, PeerConnectorContext};
use crate::shutdown::ShutdownController;
use crate::NodeError;

/// Capacity of the outbound frame queue shared by all connections.
const OUTBOUND_QUEUE: usize = 4096;

/// Capacity of the queue of addresses learned from `PEERS`.
const DIAL_QUEUE: usize = 256;

pub struct RotaNode {
    config: NodeConfig,
    chain: Arc<Mutex<Chain>>,
    peers: Arc<RwLock<PeerManager>>,
    handler: Arc<MessageHandler>,
    connection_registry: Arc<RwLock<ConnectionRegistry>>,
    shutdown: ShutdownController,
    validator: Option<Address>,
    local_addr: Option<SocketAddr>,
    /// Addresses with a dial in progress.
    dialing: Arc<Mutex<HashSet<String>>>,
    outbound_rx: Option<mpsc::Receiver<(String, Vec<u8>)>>,
    dial_rx: Option<mpsc::Receiver<String>>,
    dial_tx: mpsc::Sender<String>,
    task_handles: Vec<JoinHandle<()>>,
}

impl RotaNode {
    /// Open the ledger in `config.data_dir` and wire up the node. Nothing
    /// touches the network until [`RotaNode::start`].
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let validator = match config.validator_mnemonic.as_deref() {
            Some(phrase) => {
                let keypair = keypair_from_mnemonic(phrase)
                    .map_err(|e| NodeError::Config(format!("validator mnemonic: {e}")))?;
                Some(address_from_public(&keypair.public))
            }
            None => None,
        };

        let environment = LmdbEnvironment::open(&config.data_dir, DEFAULT_MAP_SIZE)?;
        let store: Arc<dyn SnapshotStore> = Arc::new(environment.snapshot_store());
        let mut chain = Chain::open(
            config.params.clone(),
            Arc::new(SystemClock),
            store,
            Arc::new(ScriptEngine::new()),
        )?;

        let node_id = match chain.node_id() {
            Some(id) => id.to_string(),
            None => {
                let id = generate_node_id();
                chain.set_node_id(&id);
                id
            }
        };

        let mut peers = PeerManager::new(config.public_addr.clone());
        for addr in chain.peers().chain(config.bootstrap_peers.iter().map(String::as_str)) {
            peers.add_known(addr);
        }

        match &validator {
            Some(address) => tracing::info!(validator = %address.short(), "validator identity loaded"),
            None => tracing::info!("no validator mnemonic configured, running as observer"),
        }
        tracing::info!(
            node_id = %node_id,
            height = chain.height(),
            tip = %chain.tip().hash.short(),
            known_peers = peers.known_addrs().len(),
            "ROTA node initialized"
        );

        let chain = Arc::new(Mutex::new(chain));
        let peers = Arc::new(RwLock::new(peers));
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (dial_tx, dial_rx) = mpsc::channel(DIAL_QUEUE);

        let handler = Arc::new(MessageHandler::new(
            Arc::clone(&chain),
            Arc::clone(&peers),
            Broadcaster::new(outbound_tx),
            Arc::new(SystemClock),
            node_id,
            dial_tx.clone(),
        ));

        Ok(Self {
            config,
            chain,
            peers,
            handler,
            connection_registry: Arc::new(RwLock::new(ConnectionRegistry::new())),
            shutdown: ShutdownController::new(),
            validator,
            local_addr: None,
            dialing: Arc::new(Mutex::new(HashSet::new())),
            outbound_rx: Some(outbound_rx),
            dial_rx: Some(dial_rx),
            dial_tx,
            task_handles: Vec::new(),
        })
    }

    fn connector_context(&self) -> PeerConnectorContext {
        PeerConnectorContext {
            handler: Arc::clone(&self.handler),
            connection_registry: Arc::clone(&self.connection_registry),
            shutdown: self.shutdown.subscribe(),
        }
    }

    /// Bind the listener and spawn the background tasks.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        let (Some(outbound_rx), Some(dial_rx)) = (self.outbound_rx.take(), self.dial_rx.take()) else {
            return Err(NodeError::Config("node already started".into()));
        };

        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        tracing::info!(addr = %local_addr, "P2P listener started");

        self.spawn_listener(listener);
        self.spawn_drain(outbound_rx);
        self.spawn_dialer(dial_rx);
        self.spawn_reconnect_timer();
        self.spawn_heartbeat_timer();
        if let Some(validator) = self.validator.clone() {
            self.spawn_production_timer(validator);
        }

        tracing::info!("ROTA node started");
        Ok(())
    }

    // ── P2P listener ─────────────────────────────────────────────────────

    fn spawn_listener(&mut self, listener: TcpListener) {
        let ctx = self.connector_context();
        let mut shutdown_rx = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("P2P listener shutting down");
                        break;
                    }
                    result = listener.accept() => match result {
                        Ok((stream, addr)) => match attach_connection(stream, None, &ctx).await {
                            Ok(peer_id) => tracing::info!(peer = %peer_id, "inbound peer connected"),
                            Err(e) => tracing::warn!(addr = %addr, error = %e, "failed to attach inbound peer"),
                        },
                        Err(e) => {
                            tracing::warn!(error = %e, "P2P accept error");
                        }
                    }
                }
            }
        });
        self.task_handles.push(handle);
    }

    // ── Outbound message drain (sends queued frames to peers) ──────────

    fn spawn_drain(&mut self, mut outbound_rx: mpsc::Receiver<(String, Vec<u8>)>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        let registry = Arc::clone(&self.connection_registry);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("outbound message task shutting down");
                        break;
                    }
                    Some((peer_id, frame)) = outbound_rx.recv() => {
                        let writer = registry.read().await.get(&peer_id);
                        match writer {
                            Some(writer) => {
                                if let Err(e) = write_framed(&writer, &frame).await {
                                    tracing::warn!(
                                        peer = %peer_id,
                                        error = %e,
                                        "failed to send message, disconnecting peer"
                                    );
                                    // Dropping the writer closes our half; the
                                    // read loop then cleans up the peer.
                                    registry.write().await.remove(&peer_id);
                                }
                            }
                            None => {
                                tracing::trace!(
                                    peer = %peer_id,
                                    "outbound message dropped: no connection for peer"
                                );
                            }
                        }
                    }
                }
            }
        });
        self.task_handles.push(handle);
    }

    // ── Dialing ──────────────────────────────────────────────────────────

    fn spawn_dialer(&mut self, mut dial_rx: mpsc::Receiver<String>) {
        let ctx = self.connector_context();
        let dialing = Arc::clone(&self.dialing);
        let mut shutdown_rx = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    Some(addr) = dial_rx.recv() => {
                        spawn_dial(addr, ctx.clone(), Arc::clone(&dialing));
                    }
                }
            }
        });
        self.task_handles.push(handle);
    }

    /// Redial known addresses with no live connection. The first tick fires
    /// immediately, which dials the bootstrap and persisted peers.
    fn spawn_reconnect_timer(&mut self) {
        let ctx = self.connector_context();
        let dialing = Arc::clone(&self.dialing);
        let peers = Arc::clone(&self.peers);
        let period = Duration::from_secs(self.config.reconnect_interval_secs.max(1));
        let mut shutdown_rx = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        let candidates = peers.read().await.reconnect_candidates();
                        if !candidates.is_empty() {
                            tracing::debug!(count = candidates.len(), "reconnecting to known peers");
                        }
                        for addr in candidates {
                            spawn_dial(addr, ctx.clone(), Arc::clone(&dialing));
                        }
                    }
                }
            }
        });
        self.task_handles.push(handle);
    }

    // ── Validator duties ─────────────────────────────────────────────────

    fn spawn_heartbeat_timer(&mut self) {
        let handler = Arc::clone(&self.handler);
        let validator = self.validator.clone();
        let period = Duration::from_secs(self.config.heartbeat_interval_secs.max(1));
        let mut shutdown_rx = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => handler.heartbeat(validator.as_ref()).await,
                }
            }
        });
        self.task_handles.push(handle);
    }

    fn spawn_production_timer(&mut self, validator: Address) {
        let handler = Arc::clone(&self.handler);
        let period = Duration::from_secs(self.config.block_interval_secs.max(1));
        let mut shutdown_rx = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // Skip the immediate tick so the first heartbeat registers us.
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("block production shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        handler.produce(&validator).await;
                    }
                }
            }
        });
        self.task_handles.push(handle);
    }

    // ── Shutdown ─────────────────────────────────────────────────────────

    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("ROTA node stopping");

        self.shutdown.shutdown();

        // Drop all TCP write halves (causes peer read loops to terminate)
        self.connection_registry.write().await.clear();

        for handle in self.task_handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "node task ended abnormally");
            }
        }

        let chain = self.chain.lock().await;
        if !chain.save() {
            tracing::error!("final ledger snapshot could not be saved");
        }
        chain.close()?;

        tracing::info!("ROTA node stopped");
        Ok(())
    }

    /// Block until SIGINT/SIGTERM.
    pub async fn wait_for_shutdown_signal(&self) {
        self.shutdown.wait_for_signal().await;
    }

    // ── Accessors and local operations ───────────────────────────────────

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain(&self) -> Arc<Mutex<Chain>> {
        Arc::clone(&self.chain)
    }

    pub fn handler(&self) -> Arc<MessageHandler> {
        Arc::clone(&self.handler)
    }

    pub fn node_id(&self) -> &str {
        self.handler.node_id()
    }

    pub fn validator(&self) -> Option<&Address> {
        self.validator.as_ref()
    }

    /// Bound listener address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub async fn height(&self) -> u64 {
        self.chain.lock().await.height()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.connected_count()
    }

    pub async fn is_known_peer(&self, addr: &str) -> bool {
        self.peers.read().await.is_known(addr)
    }

    pub async fn sync_state(&self) -> SyncState {
        self.handler.sync_state().await
    }

    /// Remember `addr` and dial it.
    pub async fn connect(&self, addr: &str) -> Result<(), NodeError> {
        if self.local_addr.is_none() {
            return Err(NodeError::NotStarted);
        }
        self.peers.write().await.add_known(addr);
        self.dial_tx
            .send(addr.to_string())
            .await
            .map_err(|_| NodeError::Network(rota_network::NetworkError::ChannelClosed))
    }

    pub async fn submit_transaction(&self, tx: Transaction) -> Result<AdmissionStatus, AdmissionError> {
        self.handler.submit_transaction(tx).await
    }
}

/// Dial `addr` in the background unless a dial is already in flight or a
/// live connection reaches it.
fn spawn_dial(addr: String, ctx: PeerConnectorContext, dialing: Arc<Mutex<HashSet<String>>>) {
    tokio::spawn(async move {
        if !dialing.lock().await.insert(addr.clone()) {
            return;
        }
        if !is_peer_connected(&addr, &ctx).await {
            if let Err(e) = connect_to_peer(&addr, &ctx).await {
                tracing::debug!(addr = %addr, error = %e, "dial failed");
            }
        }
        dialing.lock().await.remove(&addr);
    });
}
