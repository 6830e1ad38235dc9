//! Connection setup shared by the listener, the dialer, and the reconnect
//! loop: split the stream, register the writer, announce ourselves, and
//! spawn the read loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::RwLock;

use rota_network::NetworkError;

use crate::connection_registry::{spawn_peer_read_loop, ConnectionRegistry};
use crate::handler::MessageHandler;
use crate::shutdown::ShutdownSignal;

/// Timeout for the initial TCP connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a new connection gets wired into. All fields are cheap to clone.
#[derive(Clone)]
pub struct PeerConnectorContext {
    pub handler: Arc<MessageHandler>,
    pub connection_registry: Arc<RwLock<ConnectionRegistry>>,
    pub shutdown: ShutdownSignal,
}

/// Dial `addr` ("host:port") and attach the resulting connection.
///
/// Returns the connection id on success.
pub async fn connect_to_peer(addr: &str, ctx: &PeerConnectorContext) -> Result<String, NetworkError> {
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| NetworkError::ConnectTimeout(addr.to_string()))?
        .map_err(|e| NetworkError::ConnectionFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

    let peer_id = attach_connection(stream, Some(addr.to_string()), ctx).await?;
    tracing::info!(peer = %peer_id, addr = %addr, "outbound peer connected");
    Ok(peer_id)
}

/// Wire an established stream into the node. `dial_addr` is set for
/// connections we initiated.
///
/// The connection id is the remote socket address.
pub async fn attach_connection(
    stream: TcpStream,
    dial_addr: Option<String>,
    ctx: &PeerConnectorContext,
) -> Result<String, NetworkError> {
    let peer_id = stream.peer_addr()?.to_string();
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(peer = %peer_id, error = %e, "failed to set TCP_NODELAY");
    }
    let (read_half, write_half) = stream.into_split();

    // The writer must be registered before STATUS is queued for it.
    {
        let mut registry = ctx.connection_registry.write().await;
        registry.insert(peer_id.clone(), write_half);
    }

    ctx.handler.on_connected(&peer_id, dial_addr).await;

    spawn_peer_read_loop(
        peer_id.clone(),
        read_half,
        Arc::clone(&ctx.handler),
        Arc::clone(&ctx.connection_registry),
        ctx.shutdown.clone(),
    );

    Ok(peer_id)
}

/// Check whether some live connection already reaches `addr`.
pub async fn is_peer_connected(addr: &str, ctx: &PeerConnectorContext) -> bool {
    ctx.handler.peers().read().await.is_reachable_connected(addr)
}
