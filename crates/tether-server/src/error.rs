use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the tether server.
///
/// Only `Bind`, `InvalidAddress` and `AlreadyRunning` reach the caller of
/// [`Server::start`](crate::Server::start). Everything else is scoped to one
/// connection and ends at the connection handler, which logs it and tears
/// the connection down (`FileNotFound` excepted: the connection stays open).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("server is already running")]
    AlreadyRunning,

    #[error("no live connection {0}")]
    NotConnected(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("frame length {0} out of range")]
    FrameTooLarge(usize),

    #[error("invalid file name {0:?}")]
    InvalidFileName(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("peer closed after {received} of {expected} bytes")]
    PrematureDisconnect { received: i64, expected: i64 },

    #[error("write failed: {0}")]
    WriteFailure(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for ServerError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedMessage(e.to_string())
    }
}

impl ServerError {
    /// Whether the connection that hit this error can keep serving.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FileNotFound(_))
    }
}
