//! Envelope codec and the framing that delimits envelopes on the stream.
//!
//! ```text
//! LengthPrefixed:  [len (u32 BE)][len bytes of JSON envelope]
//! SingleRead:      [JSON envelope]   (one transport read = one envelope)
//! ```
//!
//! Raw file bytes that follow a `file` envelope are never framed.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use tether_types::Envelope;

use crate::error::ServerError;

/// Unit of raw file bytes read from or written to a stream.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Largest encoded envelope accepted in length-prefixed mode.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Serialize an envelope to its JSON wire form.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, ServerError> {
    Ok(serde_json::to_vec(envelope)?)
}

/// Parse one JSON envelope. Anything that is not a well-formed envelope with
/// a known `type` is `MalformedMessage`.
pub fn decode(bytes: &[u8]) -> Result<Envelope, ServerError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// How envelope boundaries are found on the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// 4-byte big-endian length before every envelope.
    #[default]
    LengthPrefixed,
    /// Whatever a single read of up to [`CHUNK_SIZE`] bytes returns is one
    /// envelope. Only correct when every envelope arrives in one piece;
    /// kept for peers that speak the unframed protocol.
    SingleRead,
}

impl Framing {
    /// Wrap an encoded envelope for the wire.
    pub fn frame(&self, payload: &[u8]) -> Result<Bytes, ServerError> {
        match self {
            Self::LengthPrefixed => {
                if payload.is_empty() || payload.len() > MAX_FRAME_SIZE {
                    return Err(ServerError::FrameTooLarge(payload.len()));
                }
                let mut buf = BytesMut::with_capacity(4 + payload.len());
                buf.put_u32(payload.len() as u32);
                buf.put_slice(payload);
                Ok(buf.freeze())
            }
            Self::SingleRead => {
                if payload.len() > CHUNK_SIZE {
                    return Err(ServerError::FrameTooLarge(payload.len()));
                }
                Ok(Bytes::copy_from_slice(payload))
            }
        }
    }

    /// Read the next encoded envelope. `Ok(None)` means the peer closed the
    /// stream cleanly between envelopes.
    pub async fn read_message<R>(&self, reader: &mut R) -> Result<Option<Vec<u8>>, ServerError>
    where
        R: AsyncRead + Unpin,
    {
        match self {
            Self::LengthPrefixed => {
                let mut len_buf = [0u8; 4];
                if reader.read(&mut len_buf[..1]).await? == 0 {
                    return Ok(None);
                }
                reader.read_exact(&mut len_buf[1..]).await?;

                let len = u32::from_be_bytes(len_buf) as usize;
                if len == 0 || len > MAX_FRAME_SIZE {
                    return Err(ServerError::FrameTooLarge(len));
                }

                let mut frame = vec![0u8; len];
                reader.read_exact(&mut frame).await?;
                Ok(Some(frame))
            }
            Self::SingleRead => {
                let mut buf = vec![0u8; CHUNK_SIZE];
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(buf))
            }
        }
    }

    /// Encode, frame and write one envelope.
    pub async fn write_envelope<W>(&self, writer: &mut W, envelope: &Envelope) -> Result<(), ServerError>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.frame(&encode(envelope)?)?;
        writer
            .write_all(&frame)
            .await
            .map_err(ServerError::WriteFailure)?;
        writer.flush().await.map_err(ServerError::WriteFailure)
    }
}
