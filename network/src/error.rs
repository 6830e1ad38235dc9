use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection to {addr} failed: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    #[error("connection to {0} timed out")]
    ConnectTimeout(String),

    #[error("peer {0} not found")]
    PeerNotFound(String),

    #[error("outbound channel closed")]
    ChannelClosed,

    #[error("protocol error: {0}")]
    Protocol(#[from] rota_protocol::ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
