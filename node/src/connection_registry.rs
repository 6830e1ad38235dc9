//! Connection registry: maps peer IDs to their TCP write halves.
//!
//! Shared between the connector (which registers new connections) and the
//! outbound message drain (which writes encoded frames to peers).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};

use rota_protocol::{read_frame, ProtocolError};

use crate::handler::{Disposition, MessageHandler};
use crate::shutdown::ShutdownSignal;

/// Registry of active peer TCP write halves, enabling the outbound
/// message drain to route frames to the correct peer stream.
pub struct ConnectionRegistry {
    connections: HashMap<String, Arc<Mutex<OwnedWriteHalf>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Register a peer's write half. If a previous connection existed for this
    /// peer, it is replaced (the old writer is dropped, closing its half).
    pub fn insert(&mut self, peer_id: String, writer: OwnedWriteHalf) {
        self.connections.insert(peer_id, Arc::new(Mutex::new(writer)));
    }

    pub fn remove(&mut self, peer_id: &str) -> Option<Arc<Mutex<OwnedWriteHalf>>> {
        self.connections.remove(peer_id)
    }

    /// Look up a peer's write half (returns a cheaply cloned `Arc`).
    pub fn get(&self, peer_id: &str) -> Option<Arc<Mutex<OwnedWriteHalf>>> {
        self.connections.get(peer_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn peer_ids(&self) -> Vec<&String> {
        self.connections.keys().collect()
    }

    /// Drop every writer. Each peer's read loop then sees the socket close.
    pub fn clear(&mut self) {
        self.connections.clear();
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Write an already length-prefixed frame (as produced by
/// [`rota_protocol::encode`]) to the given write half.
pub async fn write_framed(writer: &Mutex<OwnedWriteHalf>, frame: &[u8]) -> std::io::Result<()> {
    let mut w = writer.lock().await;
    w.write_all(frame).await?;
    w.flush().await?;
    Ok(())
}

/// Spawn a background task that reads frames from a peer's read half,
/// decodes them, and hands each message to the [`MessageHandler`].
///
/// On read error, disconnect, or a handler verdict to drop the peer, the
/// peer is cleaned up from both the connection registry and the handler's
/// peer and sync bookkeeping.
pub fn spawn_peer_read_loop(
    peer_id: String,
    reader: OwnedReadHalf,
    handler: Arc<MessageHandler>,
    connection_registry: Arc<RwLock<ConnectionRegistry>>,
    mut shutdown: ShutdownSignal,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let result = tokio::select! {
            biased;
            _ = shutdown.recv() => Ok(()),
            result = peer_read_loop(&peer_id, reader, &handler) => result,
        };
        match &result {
            Ok(()) => {
                tracing::info!(peer = %peer_id, "peer disconnected (clean close)");
            }
            Err(e) => {
                tracing::warn!(peer = %peer_id, error = %e, "peer disconnected with error");
            }
        }

        {
            let mut registry = connection_registry.write().await;
            registry.remove(&peer_id);
        }

        handler.on_disconnected(&peer_id).await;

        tracing::debug!(peer = %peer_id, "peer cleaned up after disconnect");
    })
}

/// Inner read loop: reads length-prefixed frames and dispatches them.
///
/// A frame whose JSON does not decode is skipped; the length prefix keeps the
/// stream aligned. Oversized frames and I/O errors end the connection.
async fn peer_read_loop(
    peer_id: &str,
    mut reader: OwnedReadHalf,
    handler: &MessageHandler,
) -> Result<(), ProtocolError> {
    loop {
        let message = match read_frame(&mut reader).await {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(ProtocolError::Malformed(reason)) => {
                tracing::debug!(peer = %peer_id, reason = %reason, "skipping malformed message");
                continue;
            }
            Err(e) => return Err(e),
        };

        if handler.handle(peer_id, message).await == Disposition::Disconnect {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn insert_replace_and_remove() {
        let (a, _a_peer) = connected_pair().await;
        let (b, _b_peer) = connected_pair().await;
        let (_, a_write) = a.into_split();
        let (_, b_write) = b.into_split();

        let mut registry = ConnectionRegistry::new();
        assert!(registry.is_empty());
        registry.insert("peer".into(), a_write);
        registry.insert("peer".into(), b_write);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("peer").is_some());
        assert!(registry.remove("peer").is_some());
        assert!(registry.get("peer").is_none());
    }

    #[tokio::test]
    async fn write_framed_sends_bytes_verbatim() {
        let (client, mut server) = connected_pair().await;
        let (_, write) = client.into_split();
        let writer = Mutex::new(write);

        let frame = [0u8, 0, 0, 2, b'{', b'}'];
        write_framed(&writer, &frame).await.unwrap();

        let mut received = [0u8; 6];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, frame);
    }
}
