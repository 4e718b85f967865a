//! Durable append-only operation trace (`operation_state.jsonl`).
//!
//! Every execution writes a `started` record and then one terminal record.
//! The file is only ever opened in append mode; nothing rewrites it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Started,
    Succeeded,
    Failed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub op_key: String,
    pub op_id: String,
    pub actor: String,
    pub idempotency_key: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: TraceStatus,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug)]
pub struct OperationTrace {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl OperationTrace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &TraceRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Newest `limit` records, newest first. Unparseable lines are skipped.
    pub async fn read_recent(&self, limit: usize) -> std::io::Result<Vec<TraceRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut records = Vec::with_capacity(limit.min(256));
        for line in content.lines().rev() {
            if records.len() >= limit {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TraceRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping malformed trace line: {}", e),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(op_id: &str, status: TraceStatus) -> TraceRecord {
        TraceRecord {
            op_key: "server:restart".into(),
            op_id: op_id.into(),
            actor: "alice".into(),
            idempotency_key: None,
            started_at: Utc::now(),
            finished_at: None,
            status,
            error: String::new(),
        }
    }

    #[tokio::test]
    async fn test_append_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history").join("operation_state.jsonl");

        let trace = OperationTrace::new(&path);
        trace.append(&record("a", TraceStatus::Started)).await.unwrap();
        trace.append(&record("a", TraceStatus::Succeeded)).await.unwrap();
        drop(trace);

        let reopened = OperationTrace::new(&path);
        reopened.append(&record("b", TraceStatus::Started)).await.unwrap();

        let recent = reopened.read_recent(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].op_id, "b");
        assert_eq!(recent[2].status, TraceStatus::Started);
    }

    #[tokio::test]
    async fn test_read_recent_skips_garbage_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("operation_state.jsonl");
        let trace = OperationTrace::new(&path);
        for i in 0..5 {
            trace.append(&record(&i.to_string(), TraceStatus::Started)).await.unwrap();
        }
        let mut file = tokio::fs::OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"not json\n").await.unwrap();

        let recent = trace.read_recent(2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|r| r.op_id.as_str()).collect();
        assert_eq!(ids, vec!["4", "3"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let trace = OperationTrace::new(dir.path().join("none.jsonl"));
        assert!(trace.read_recent(5).await.unwrap().is_empty());
    }
}
