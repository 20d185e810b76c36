//! Tether: a TCP server that carries text messages and file transfers over
//! one persistent connection per client.
//!
//! - One task per accepted connection, one accept task
//! - JSON envelopes, length-prefixed by default (see [`codec::Framing`])
//! - Raw file bytes follow a `file` envelope on the same stream
//! - Interrupted uploads resume from the in-memory [`TransferLedger`]
//! - Outbound writes serialized per connection
//! - All reporting through a broadcast channel of [`ServerEvent`]s

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod ledger;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod server;

pub use codec::{CHUNK_SIZE, Framing, MAX_FRAME_SIZE, decode, encode};
pub use config::ServerConfig;
pub use error::ServerError;
pub use events::EventBus;
pub use ledger::TransferLedger;
pub use server::{DEFAULT_PORT, Server};
pub use tether_types::{Envelope, FileHeader, ServerEvent, TransferDirection};
