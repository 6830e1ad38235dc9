//! Wire protocol: message framing, encoding/decoding, handshake checks.

pub mod codec;
pub mod error;
pub mod handshake;

pub use codec::{decode, encode, read_frame, write_frame, MAX_MESSAGE_SIZE};
pub use error::ProtocolError;
pub use handshake::{check_status, generate_node_id, NODE_ID_BYTES};
