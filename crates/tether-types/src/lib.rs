//! Wire envelopes and server events shared between the tether server and
//! whatever drives it.

pub mod envelope;
pub mod events;

pub use envelope::{Envelope, FileHeader};
pub use events::{ServerEvent, TransferDirection};
