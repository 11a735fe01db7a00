use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::entry::AuditEntry;

/// Errors that can occur during audit log I/O.
#[derive(Debug, thiserror::Error)]
pub enum AuditWriteError {
    #[error("failed to create audit log directory: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to open audit log file: {0}")]
    OpenFile(std::io::Error),

    #[error("failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write to audit log: {0}")]
    Write(std::io::Error),

    #[error("failed to flush audit log: {0}")]
    Flush(std::io::Error),
}

/// Append-only file writer producing one newline-terminated JSON object per
/// entry. Retention and rotation belong to the collaborator that ships the
/// file; this writer only appends.
pub struct AuditWriter {
    file: tokio::fs::File,
    entries_written: u64,
}

impl AuditWriter {
    /// Open (or create) the audit log at `path` in append mode, creating
    /// parent directories as needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditWriteError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(AuditWriteError::CreateDir)?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(AuditWriteError::OpenFile)?;

        Ok(Self {
            file,
            entries_written: 0,
        })
    }

    /// Serialize `entry` as one JSON line and append it.
    pub async fn write(&mut self, entry: &AuditEntry) -> Result<(), AuditWriteError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        self.file
            .write_all(&line)
            .await
            .map_err(AuditWriteError::Write)?;
        self.entries_written += 1;

        Ok(())
    }

    /// Flush buffered data to disk.
    pub async fn flush(&mut self) -> Result<(), AuditWriteError> {
        self.file.flush().await.map_err(AuditWriteError::Flush)
    }

    /// Number of entries appended by this writer instance.
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{AuditEventType, AuditSource};

    #[tokio::test]
    async fn writes_one_json_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let mut writer = AuditWriter::open(&path).await.unwrap();
        for i in 0..3 {
            let entry = AuditEntry::new(
                AuditEventType::CommandAllowed,
                AuditSource::new("test"),
                serde_json::json!({"n": i}),
            );
            writer.write(&entry).await.unwrap();
        }
        writer.flush().await.unwrap();
        assert_eq!(writer.entries_written(), 3);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let parsed: AuditEntry = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.event_type, AuditEventType::CommandAllowed);
        }
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/audit.jsonl");
        let writer = AuditWriter::open(&path).await;
        assert!(writer.is_ok());
        assert!(path.parent().unwrap().exists());
    }
}
