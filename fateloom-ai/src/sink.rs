//! A file-backed memory sink.
//!
//! Appends every record as one JSON line to a journal file. Retrieval
//! and ranking live elsewhere; the engine only ever writes.

use async_trait::async_trait;
use fateloom_core::provider::{MemoryError, MemoryRecord, MemorySink};
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// [`MemorySink`] that appends JSON lines to a file.
pub struct JournalSink {
    path: PathBuf,
    // Serializes appends so concurrent records never interleave lines.
    write_lock: Mutex<()>,
}

impl JournalSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl MemorySink for JournalSink {
    async fn record(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        let mut line =
            serde_json::to_string(&record).map_err(|e| MemoryError(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| MemoryError(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| MemoryError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fateloom_core::character::CharacterId;
    use fateloom_core::provider::MemoryKind;
    use fateloom_core::SessionId;

    fn record(title: &str) -> MemoryRecord {
        MemoryRecord {
            title: title.to_string(),
            content: "content".to_string(),
            kind: MemoryKind::Decision,
            importance: 0.4,
            character_id: CharacterId::new(),
            session_id: SessionId::new(),
        }
    }

    #[tokio::test]
    async fn test_records_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let sink = JournalSink::new(&path);

        sink.record(record("first")).await.unwrap();
        sink.record(record("second")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: MemoryRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.title, "first");
    }

    #[tokio::test]
    async fn test_unwritable_path_reports_error() {
        let sink = JournalSink::new("/nonexistent-dir/journal.jsonl");
        let result = sink.record(record("lost")).await;
        assert!(result.is_err());
    }
}
