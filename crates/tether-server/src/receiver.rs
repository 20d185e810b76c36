use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use tether_types::{FileHeader, ServerEvent, TransferDirection};

use crate::codec::CHUNK_SIZE;
use crate::error::ServerError;
use crate::events::EventBus;
use crate::ledger::TransferLedger;

/// Resolve where an upload lands: the header's explicit `filepath` if given,
/// otherwise the base name of `filename` under `storage_dir`.
pub fn destination(storage_dir: &Path, header: &FileHeader) -> Result<PathBuf, ServerError> {
    if let Some(path) = header.filepath.as_deref().filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let name = Path::new(&header.filename)
        .file_name()
        .ok_or_else(|| ServerError::InvalidFileName(header.filename.clone()))?;
    Ok(storage_dir.join(name))
}

/// Writes the raw bytes that follow a `file` envelope to disk.
pub struct FileReceiver<'a> {
    pub ledger: &'a TransferLedger,
    pub events: &'a EventBus,
    pub storage_dir: &'a Path,
}

impl FileReceiver<'_> {
    /// Consume exactly the bytes still owed for `header` from `reader`.
    ///
    /// Picks up from the ledger offset for `conn_id` if an earlier attempt
    /// was cut short. Never reads past the declared size, so whatever comes
    /// after the file on the stream is left for the next envelope.
    /// Returns the total bytes received on success.
    pub async fn receive<R>(
        &self,
        reader: &mut R,
        conn_id: &str,
        header: &FileHeader,
    ) -> Result<i64, ServerError>
    where
        R: AsyncRead + Unpin,
    {
        let total = header.filesize;
        if total < 0 {
            return Err(ServerError::MalformedMessage(format!(
                "negative filesize {} for {}",
                total, header.filename
            )));
        }

        let path = destination(self.storage_dir, header)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        // Only record the transfer once the destination is open.
        let mut file = match self.ledger.get(conn_id) {
            Some(offset) => {
                info!(
                    "Resuming {} from {} at {}/{} bytes",
                    header.filename, conn_id, offset, total
                );
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await?
            }
            None => {
                info!(
                    "Receiving {} ({} bytes) from {} into {}",
                    header.filename,
                    total,
                    conn_id,
                    path.display()
                );
                fs::File::create(&path).await?
            }
        };
        let (mut received, _) = self.ledger.begin(conn_id);

        let mut buf = vec![0u8; CHUNK_SIZE];
        while received < total {
            let want = (total - received).min(CHUNK_SIZE as i64) as usize;
            let n = reader.read(&mut buf[..want]).await?;
            if n == 0 {
                file.flush().await.map_err(ServerError::WriteFailure)?;
                warn!(
                    "{} closed during {} at {}/{} bytes, keeping offset for resume",
                    conn_id, header.filename, received, total
                );
                return Err(ServerError::PrematureDisconnect {
                    received,
                    expected: total,
                });
            }

            file.write_all(&buf[..n])
                .await
                .map_err(ServerError::WriteFailure)?;
            received = self.ledger.advance(conn_id, n);

            debug!("{} <- {}: {}/{}", header.filename, conn_id, received, total);
            self.events.emit(ServerEvent::FileProgress {
                conn_id: conn_id.to_string(),
                filename: header.filename.clone(),
                current: received,
                total,
                direction: TransferDirection::Inbound,
            });
        }

        file.flush().await.map_err(ServerError::WriteFailure)?;
        self.ledger.finish(conn_id);

        info!("Received {} from {} ({} bytes)", header.filename, conn_id, received);
        self.events.emit(ServerEvent::FileCompleted {
            conn_id: conn_id.to_string(),
            filename: header.filename.clone(),
        });

        Ok(received)
    }
}
