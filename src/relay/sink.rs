//! # Result Sink
//!
//! Durable append-only store of classification outcomes: one CSV line per event,
//! in the order events are produced, never rewriting prior entries.
//!
//! Whole lines are written under a mutex so concurrent requests can never
//! interleave partial records. A write failure is reported to the caller (who logs
//! and continues); it does not roll back the already-published bus event.

use crate::error::{AppError, AppResult};
use crate::relay::event::ClassificationEvent;
use crate::relay::EventSink;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only CSV sink.
pub struct CsvResultSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl EventSink for CsvResultSink {
    async fn append(&self, event: &ClassificationEvent) -> AppResult<()> {
        let line = format!("{}\n", event.csv_line());

        // Holding the lock across open+write keeps appends whole-line atomic
        let _guard = self.write_lock.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AppError::Sink(format!("open {}: {}", self.path.display(), e)))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::Sink(format!("append {}: {}", self.path.display(), e)))?;

        file.flush()
            .await
            .map_err(|e| AppError::Sink(format!("flush {}: {}", self.path.display(), e)))?;

        Ok(())
    }
}

/// Overwrite the scratch file holding the most recent raw upload.
///
/// Best-effort diagnostic side effect of /upload for offline inspection; the
/// caller logs failures and continues.
pub async fn save_latest_capture(path: impl AsRef<Path>, raw: &[u8]) -> AppResult<()> {
    tokio::fs::write(path.as_ref(), raw)
        .await
        .map_err(|e| AppError::Sink(format!("write {}: {}", path.as_ref().display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;

    fn event(label: &str, confidence: f32) -> ClassificationEvent {
        ClassificationEvent::from_classification(
            &Classification {
                label: label.to_string(),
                confidence,
            },
            None,
        )
    }

    #[tokio::test]
    async fn test_append_writes_one_line_per_event_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let sink = CsvResultSink::new(&path);

        sink.append(&event("bark", 0.91)).await.unwrap();
        sink.append(&event("Silence", 0.33)).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(",bark,0.91"));
        assert!(lines[1].ends_with(",Silence,0.33"));
    }

    #[tokio::test]
    async fn test_append_never_rewrites_prior_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let sink = CsvResultSink::new(&path);

        sink.append(&event("bark", 0.91)).await.unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        sink.append(&event("bark", 0.50)).await.unwrap();
        let second = std::fs::read_to_string(&path).unwrap();

        assert!(second.starts_with(&first));
    }

    #[tokio::test]
    async fn test_append_to_unwritable_path_is_sink_error() {
        let sink = CsvResultSink::new("/nonexistent-dir/results.csv");
        match sink.append(&event("bark", 0.91)).await {
            Err(AppError::Sink(_)) => {}
            other => panic!("expected Sink error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_save_latest_capture_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_audio.raw");

        save_latest_capture(&path, &[1, 2, 3]).await.unwrap();
        save_latest_capture(&path, &[9, 9]).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![9, 9]);
    }
}
