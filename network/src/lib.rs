//! P2P networking layer for ROTA.
//!
//! Peer discovery and connection tracking, outbound broadcasting, and the
//! chain synchronization state machine. Socket handling itself lives in the
//! node crate; everything here is transport-agnostic.

pub mod broadcast;
pub mod error;
pub mod peer_manager;
pub mod sync;

pub use broadcast::{BroadcastResult, Broadcaster};
pub use error::NetworkError;
pub use peer_manager::{PeerManager, PeerState};
pub use sync::{BlockOutcome, ChainPage, SyncAction, SyncManager, SyncState, STALL_TIMEOUT_MS};
