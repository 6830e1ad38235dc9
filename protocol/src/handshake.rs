//! STATUS handshake checks and node identity.

use rand::RngCore;
use rota_messages::Status;

use crate::ProtocolError;

/// Random bytes in a node id.
pub const NODE_ID_BYTES: usize = 8;

/// Fresh random node id, hex encoded.
pub fn generate_node_id() -> String {
    let mut bytes = [0u8; NODE_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validate a peer's STATUS against our own identity.
///
/// A STATUS carrying our node id means we dialed ourselves (usually through
/// our own public address) and the connection must be dropped.
pub fn check_status(our_node_id: &str, status: &Status) -> Result<(), ProtocolError> {
    if status.node_id.is_empty() {
        return Err(ProtocolError::HandshakeFailed("empty node id".into()));
    }
    if status.node_id == our_node_id {
        return Err(ProtocolError::SelfConnection);
    }
    if status.height == 0 {
        return Err(ProtocolError::HandshakeFailed(
            "peer reports an empty chain".into(),
        ));
    }
    Ok(())
}
