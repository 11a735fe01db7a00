use std::path::Path;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::entry::AuditEntry;
use crate::writer::AuditWriter;

/// Channel buffer between producers and the background writer task.
const CHANNEL_BUFFER: usize = 256;

/// Flush the writer after this long of channel inactivity.
const FLUSH_IDLE_SECS: u64 = 1;

/// A cheap, cloneable handle for submitting [`AuditEntry`] values to the
/// background writer. `Clone + Send + Sync`, so it can be shared across
/// tasks freely.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditSink {
    /// Open the log file, spawn the background writer, and return the
    /// `(sink, join_handle)` pair. The task drains until every sink clone is
    /// dropped, then flushes once more and exits.
    pub async fn start(
        path: impl AsRef<Path>,
    ) -> Result<(Self, JoinHandle<()>), crate::writer::AuditWriteError> {
        let (tx, rx) = mpsc::channel::<AuditEntry>(CHANNEL_BUFFER);

        let mut writer = AuditWriter::open(path).await?;

        let handle = tokio::spawn(async move {
            drain(&mut writer, rx).await;
        });

        Ok((Self { tx }, handle))
    }

    /// Submit an entry, waiting for channel space if necessary.
    pub async fn log(&self, entry: AuditEntry) {
        if let Err(err) = self.tx.send(entry).await {
            tracing::warn!(
                event_type = ?err.0.event_type,
                "audit sink channel closed; entry dropped"
            );
        }
    }

    /// Submit an entry from a synchronous context. Drops the entry (with a
    /// warning) when the channel is full rather than blocking the caller.
    pub fn try_log(&self, entry: AuditEntry) {
        if let Err(err) = self.tx.try_send(entry) {
            tracing::warn!(error = %err, "audit sink busy or closed; entry dropped");
        }
    }
}

/// Background loop: write entries as they arrive, flush on idle, flush once
/// more on channel close. I/O errors are logged and the entry skipped; audit
/// failures never take the dispatcher down.
async fn drain(writer: &mut AuditWriter, mut rx: mpsc::Receiver<AuditEntry>) {
    let idle = tokio::time::Duration::from_secs(FLUSH_IDLE_SECS);
    let mut dirty = false;

    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(entry)) => {
                if let Err(err) = writer.write(&entry).await {
                    tracing::error!(%err, "failed to write audit entry");
                } else {
                    dirty = true;
                }
            }
            Ok(None) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "final audit flush failed");
                    }
                }
                tracing::debug!(
                    entries = writer.entries_written(),
                    "audit writer shutting down"
                );
                return;
            }
            Err(_) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "periodic audit flush failed");
                    } else {
                        dirty = false;
                    }
                }
            }
        }
    }
}
