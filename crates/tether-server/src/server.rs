use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tether_types::{Envelope, ServerEvent};

use crate::config::ServerConfig;
use crate::connection;
use crate::error::ServerError;
use crate::events::EventBus;
use crate::ledger::TransferLedger;
use crate::registry::Registry;
use crate::sender::FileSender;

/// Port used when the host process does not pick one.
pub const DEFAULT_PORT: u16 = 8899;

/// Listen backlog for the accept socket.
const LISTEN_BACKLOG: i32 = 1024;

/// State shared by the accept loop and every connection task.
pub(crate) struct ServerInner {
    pub(crate) config: ServerConfig,
    pub(crate) events: EventBus,
    pub(crate) registry: Registry,
    pub(crate) ledger: TransferLedger,
    running: Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// The tether server core.
///
/// Cheap to clone; clones share the same listener, registry, ledger and
/// event bus.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            inner: Arc::new(ServerInner {
                config,
                events,
                registry: Registry::new(),
                ledger: TransferLedger::new(),
                running: Mutex::new(None),
            }),
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.events.subscribe()
    }

    /// Bind `host:port` and start accepting in the background. Port 0 picks
    /// an ephemeral port; the bound address is returned.
    pub async fn start(&self, port: u16) -> Result<SocketAddr, ServerError> {
        let mut running = self.inner.running.lock().await;
        if running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let ip: IpAddr = self
            .inner
            .config
            .host
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.inner.config.host.clone()))?;
        let addr = SocketAddr::new(ip, port);

        let listener = bind_listener(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let cancel = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(self.inner.clone(), listener, cancel.clone()));
        *running = Some(Running {
            cancel,
            accept_task,
            local_addr,
        });

        info!("Server started on {}", local_addr);
        self.inner.events.emit(ServerEvent::ServerStarted {
            message: format!("Server started on port {}", local_addr.port()),
        });
        Ok(local_addr)
    }

    /// Stop accepting and release the listening socket. Connections already
    /// accepted keep running until their peers leave. No-op if not running.
    pub async fn stop(&self) {
        let Some(running) = self.inner.running.lock().await.take() else {
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.accept_task.await {
            warn!("Accept task ended abnormally: {}", e);
        }

        info!("Server stopped ({})", running.local_addr);
        self.inner.events.emit(ServerEvent::ServerStopped {
            message: "Server stopped.".into(),
        });
    }

    pub async fn is_running(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Identifiers of every live connection.
    pub async fn connected_clients(&self) -> Vec<String> {
        self.inner.registry.ids().await
    }

    /// Bytes already received for the unfinished upload on `conn_id`.
    pub fn transfer_offset(&self, conn_id: &str) -> Option<i64> {
        self.inner.ledger.get(conn_id)
    }

    pub fn ledger(&self) -> &TransferLedger {
        &self.inner.ledger
    }

    /// Write `data` to a client as-is, unframed. Returns false without
    /// side effects if the client is gone or the write fails.
    pub async fn send_data(&self, conn_id: &str, data: &str) -> bool {
        let Some(handle) = self.inner.registry.get(conn_id).await else {
            debug!("send_data: no live connection {}", conn_id);
            return false;
        };

        let written = {
            let mut writer = handle.lock().await;
            match writer.write_all(data.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            warn!("send_data to {} failed: {}", conn_id, e);
            return false;
        }

        self.inner.events.emit(ServerEvent::DataSent {
            conn_id: conn_id.to_string(),
            data: data.to_string(),
        });
        true
    }

    /// Send one framed envelope to a client.
    pub async fn send_envelope(&self, conn_id: &str, envelope: &Envelope) -> Result<(), ServerError> {
        let handle = self
            .inner
            .registry
            .get(conn_id)
            .await
            .ok_or_else(|| ServerError::NotConnected(conn_id.to_string()))?;

        let mut writer = handle.lock().await;
        self.inner
            .config
            .framing
            .write_envelope(&mut *writer, envelope)
            .await
    }

    /// Push a local file to a client, exactly as if it had sent a
    /// `request_file` for `path`.
    pub async fn send_file(&self, conn_id: &str, path: impl AsRef<Path>) -> Result<i64, ServerError> {
        let handle = self
            .inner
            .registry
            .get(conn_id)
            .await
            .ok_or_else(|| ServerError::NotConnected(conn_id.to_string()))?;

        let sender = FileSender {
            events: &self.inner.events,
            framing: self.inner.config.framing,
        };
        let mut writer = handle.lock().await;
        sender.send(&mut *writer, conn_id, path.as_ref()).await
    }
}

fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    TcpListener::from_std(socket.into())
}

async fn accept_loop(inner: Arc<ServerInner>, listener: TcpListener, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    tokio::spawn(connection::handle_connection(inner.clone(), stream, peer));
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            },
        }
    }
    debug!("Accept loop exited");
}
