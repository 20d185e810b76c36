use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use tether_types::{Envelope, FileHeader, ServerEvent, TransferDirection};

use crate::codec::{CHUNK_SIZE, Framing};
use crate::error::ServerError;
use crate::events::EventBus;

/// Streams a local file to a peer: one `file` envelope, then the raw bytes.
pub struct FileSender<'a> {
    pub events: &'a EventBus,
    pub framing: Framing,
}

impl FileSender<'_> {
    /// Push `path` to `writer` in [`CHUNK_SIZE`] pieces, emitting progress
    /// after each one. Nothing is written if the file does not exist.
    /// Returns the number of bytes sent.
    pub async fn send<W>(&self, writer: &mut W, conn_id: &str, path: &Path) -> Result<i64, ServerError>
    where
        W: AsyncWrite + Unpin,
    {
        let metadata = match fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(ServerError::FileNotFound(path.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ServerError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let total = metadata.len() as i64;
        let file = fs::File::open(path).await?;

        let header = Envelope::File(FileHeader {
            filename: filename.clone(),
            filesize: total,
            filepath: Some(path.display().to_string()),
        });
        self.framing.write_envelope(writer, &header).await?;

        let sent = self.stream_body(file, writer, conn_id, &filename, total).await?;

        info!("File {} sent to {} ({} bytes)", filename, conn_id, sent);
        Ok(sent)
    }

    /// Copy at most `total` bytes from `source` to `writer`. Bytes past the
    /// size announced in the header are never sent, even if the file grew.
    async fn stream_body<R, W>(
        &self,
        source: R,
        writer: &mut W,
        conn_id: &str,
        filename: &str,
        total: i64,
    ) -> Result<i64, ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut source = source.take(total.max(0) as u64);
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut sent: i64 = 0;
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer
                .write_all(&buf[..n])
                .await
                .map_err(ServerError::WriteFailure)?;
            sent += n as i64;

            debug!("{} -> {}: {}/{}", filename, conn_id, sent, total);
            self.events.emit(ServerEvent::FileProgress {
                conn_id: conn_id.to_string(),
                filename: filename.to_string(),
                current: sent,
                total,
                direction: TransferDirection::Outbound,
            });
        }
        writer.flush().await.map_err(ServerError::WriteFailure)?;

        if sent < total {
            warn!("{} shrank while sending to {}: {}/{} bytes", filename, conn_id, sent, total);
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use std::fs as stdfs;
    use std::path::PathBuf;

    use super::*;
    use crate::codec::decode;

    fn source_file(name: &str, data: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tether_sender_{}", std::process::id()));
        stdfs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        stdfs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn header_then_raw_bytes() {
        let data: Vec<u8> = (0..20000u32).map(|i| (i % 251) as u8).collect();
        let path = source_file("out.bin", &data);
        let events = EventBus::new(64);
        let mut rx = events.subscribe();
        let sender = FileSender { events: &events, framing: Framing::LengthPrefixed };

        let mut wire = Vec::new();
        assert_eq!(sender.send(&mut wire, "c1", &path).await.unwrap(), 20000);

        let mut reader = wire.as_slice();
        let frame = Framing::LengthPrefixed.read_message(&mut reader).await.unwrap().unwrap();
        match decode(&frame).unwrap() {
            Envelope::File(header) => {
                assert_eq!(header.filename, "out.bin");
                assert_eq!(header.filesize, 20000);
                assert_eq!(header.filepath.as_deref(), Some(path.to_str().unwrap()));
            }
            other => panic!("expected file header, got {:?}", other),
        }
        assert_eq!(reader, data.as_slice());

        let mut currents = Vec::new();
        while let Ok(ServerEvent::FileProgress { current, total, direction, .. }) = rx.try_recv() {
            assert_eq!(total, 20000);
            assert_eq!(direction, TransferDirection::Outbound);
            currents.push(current);
        }
        assert_eq!(currents.last(), Some(&20000));
        assert!(currents.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn body_never_exceeds_announced_size() {
        let events = EventBus::new(64);
        let mut rx = events.subscribe();
        let sender = FileSender { events: &events, framing: Framing::LengthPrefixed };

        // Source holds more than the header announced, as if the file grew.
        let grown = vec![7u8; 10000];
        let mut wire = Vec::new();
        let sent = sender
            .stream_body(grown.as_slice(), &mut wire, "c1", "grow.log", 9000)
            .await
            .unwrap();

        assert_eq!(sent, 9000);
        assert_eq!(wire.len(), 9000);
        while let Ok(ServerEvent::FileProgress { current, total, .. }) = rx.try_recv() {
            assert!(current <= total);
        }
    }

    #[tokio::test]
    async fn missing_file_writes_nothing() {
        let events = EventBus::new(8);
        let sender = FileSender { events: &events, framing: Framing::LengthPrefixed };
        let path = std::env::temp_dir().join("tether_sender_does_not_exist.bin");

        let mut wire = Vec::new();
        let err = sender.send(&mut wire, "c1", &path).await.unwrap_err();
        assert!(matches!(err, ServerError::FileNotFound(_)));
        assert!(err.is_recoverable());
        assert!(wire.is_empty());
    }
}
