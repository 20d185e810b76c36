use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, info, warn};

use tether_types::{Envelope, ServerEvent};

use crate::codec::decode;
use crate::error::ServerError;
use crate::receiver::FileReceiver;
use crate::registry::ConnectionHandle;
use crate::sender::FileSender;
use crate::server::ServerInner;

/// Serve one accepted connection until the peer goes away or something
/// fails. Registers the connection for its whole lifetime and reports
/// connect/disconnect exactly once each.
pub(crate) async fn handle_connection(inner: Arc<ServerInner>, stream: TcpStream, peer: SocketAddr) {
    let conn_id = peer.to_string();

    if let Err(e) = socket2::SockRef::from(&stream).set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", conn_id, e);
    }

    let (mut reader, writer) = stream.into_split();
    let handle = ConnectionHandle::new(writer);

    if !inner.registry.insert(&conn_id, handle.clone()).await {
        warn!("Connection {} is already registered, dropping duplicate", conn_id);
        return;
    }
    info!(
        "Client connected: {} ({} live)",
        conn_id,
        inner.registry.len().await
    );
    inner.events.emit(ServerEvent::ClientConnected {
        conn_id: conn_id.clone(),
    });

    match read_loop(&inner, &mut reader, &handle, &conn_id).await {
        Ok(()) => info!("Client disconnected: {}", conn_id),
        Err(e @ ServerError::PrematureDisconnect { .. }) => {
            info!("Client disconnected mid-transfer: {} ({})", conn_id, e)
        }
        Err(e) => warn!("Error with client {}: {}", conn_id, e),
    }

    inner.registry.remove(&conn_id).await;
    inner.events.emit(ServerEvent::ClientDisconnected { conn_id });
}

/// Read envelopes one after another and act on each. Returns `Ok(())` on an
/// orderly close between envelopes.
async fn read_loop(
    inner: &ServerInner,
    reader: &mut OwnedReadHalf,
    handle: &ConnectionHandle,
    conn_id: &str,
) -> Result<(), ServerError> {
    let framing = inner.config.framing;

    loop {
        let Some(message) = framing.read_message(reader).await? else {
            return Ok(());
        };

        let envelope = decode(&message)?;
        debug!("{} sent {} envelope", conn_id, envelope.kind());
        match envelope {
            Envelope::Text { text } => {
                debug!("Text from {}: {} bytes", conn_id, text.len());
                inner.events.emit(ServerEvent::TextReceived {
                    conn_id: conn_id.to_string(),
                    text,
                });
            }
            Envelope::File(header) => {
                let receiver = FileReceiver {
                    ledger: &inner.ledger,
                    events: &inner.events,
                    storage_dir: &inner.config.storage_dir,
                };
                receiver.receive(reader, conn_id, &header).await?;
            }
            Envelope::FileRequest { filepath } => {
                info!("{} requested {}", conn_id, filepath);
                let sender = FileSender {
                    events: &inner.events,
                    framing,
                };
                let mut writer = handle.lock().await;
                match sender.send(&mut *writer, conn_id, Path::new(&filepath)).await {
                    Ok(_) => {}
                    Err(e) if e.is_recoverable() => {
                        warn!("Request from {} not served: {}", conn_id, e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }
}
