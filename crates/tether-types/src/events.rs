use std::fmt;

use serde::{Deserialize, Serialize};

/// Which way file bytes are flowing relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Client uploading to the server.
    Inbound,
    /// Server pushing a file to the client.
    Outbound,
}

/// Everything the server reports to its host process.
///
/// Events from different connections interleave freely; each
/// connection-scoped event carries the connection identifier (the peer
/// address) so consumers can attribute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    ServerStarted {
        message: String,
    },
    ServerStopped {
        message: String,
    },
    ClientConnected {
        conn_id: String,
    },
    ClientDisconnected {
        conn_id: String,
    },
    TextReceived {
        conn_id: String,
        text: String,
    },
    FileProgress {
        conn_id: String,
        filename: String,
        current: i64,
        total: i64,
        direction: TransferDirection,
    },
    FileCompleted {
        conn_id: String,
        filename: String,
    },
    DataSent {
        conn_id: String,
        data: String,
    },
}

impl ServerEvent {
    /// Connection this event belongs to. `None` for server lifecycle events.
    pub fn conn_id(&self) -> Option<&str> {
        match self {
            Self::ServerStarted { .. } | Self::ServerStopped { .. } => None,
            Self::ClientConnected { conn_id }
            | Self::ClientDisconnected { conn_id }
            | Self::TextReceived { conn_id, .. }
            | Self::FileProgress { conn_id, .. }
            | Self::FileCompleted { conn_id, .. }
            | Self::DataSent { conn_id, .. } => Some(conn_id.as_str()),
        }
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerStarted { message } | Self::ServerStopped { message } => {
                write!(f, "{}", message)
            }
            Self::ClientConnected { conn_id } => write!(f, "Client connected: {}", conn_id),
            Self::ClientDisconnected { conn_id } => {
                write!(f, "Client disconnected: {}", conn_id)
            }
            Self::TextReceived { conn_id, text } => write!(f, "Text from {}: {}", conn_id, text),
            Self::FileProgress {
                conn_id,
                filename,
                current,
                total,
                direction,
            } => {
                let verb = match direction {
                    TransferDirection::Inbound => "from",
                    TransferDirection::Outbound => "to",
                };
                write!(
                    f,
                    "File progress {} {}: {} ({}/{})",
                    verb, conn_id, filename, current, total
                )
            }
            Self::FileCompleted { conn_id, filename } => {
                write!(f, "File received from {}: {}", conn_id, filename)
            }
            Self::DataSent { conn_id, data } => write!(f, "Data sent to {}: {}", conn_id, data),
        }
    }
}
