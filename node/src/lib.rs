//! ROTA full node.
//!
//! Wires the ledger to the network:
//! - Accepts and dials peer connections and tracks them in a registry
//! - Dispatches inbound protocol messages to the chain and the sync manager
//! - Relays accepted transactions and blocks
//! - Announces the local validator and produces blocks in its slot
//! - Loads configuration from TOML and initialises structured logging

pub mod config;
pub mod connection_registry;
pub mod error;
pub mod handler;
pub mod logging;
pub mod node;
pub mod peer_connector;
pub mod shutdown;

pub use config::NodeConfig;
pub use connection_registry::ConnectionRegistry;
pub use error::NodeError;
pub use handler::{Disposition, MessageHandler, CHAIN_PAGE_BLOCKS};
pub use logging::{init_logging, LogFormat};
pub use node::RotaNode;
pub use peer_connector::{attach_connection, connect_to_peer, is_peer_connected, PeerConnectorContext};
pub use shutdown::{ShutdownController, ShutdownSignal};
