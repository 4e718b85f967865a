//! Rotating audit log.
//!
//! One JSON object per line. When the file reaches `max_bytes` it is shifted
//! to `<file>.1`, older generations move up, and `<file>.<keep>` is dropped.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_KEEP: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent<'a> {
    pub ts: i64,
    pub actor: &'a str,
    pub action: &'a str,
    pub target: &'a str,
    pub result: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_id: Option<&'a str>,
}

#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    max_bytes: u64,
    keep: usize,
    lock: Mutex<()>,
}

fn generation(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_rotation(path, DEFAULT_MAX_BYTES, DEFAULT_KEEP)
    }

    pub fn with_rotation(path: impl Into<PathBuf>, max_bytes: u64, keep: usize) -> Self {
        Self {
            path: path.into(),
            max_bytes,
            keep: keep.max(1),
            lock: Mutex::new(()),
        }
    }

    pub async fn record(
        &self,
        actor: &str,
        action: &str,
        target: &str,
        result: &str,
        op_id: Option<&str>,
    ) -> std::io::Result<()> {
        let event = AuditEvent {
            ts: Utc::now().timestamp(),
            actor,
            action,
            target,
            result,
            op_id,
        };
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.rotate_if_needed().await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    async fn rotate_if_needed(&self) -> std::io::Result<bool> {
        if self.max_bytes == 0 {
            return Ok(false);
        }
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if size < self.max_bytes {
            return Ok(false);
        }

        let oldest = generation(&self.path, self.keep);
        if tokio::fs::try_exists(&oldest).await? {
            tokio::fs::remove_file(&oldest).await?;
        }
        for n in (1..self.keep).rev() {
            let src = generation(&self.path, n);
            if tokio::fs::try_exists(&src).await? {
                tokio::fs::rename(&src, generation(&self.path, n + 1)).await?;
            }
        }
        tokio::fs::rename(&self.path, generation(&self.path, 1)).await?;
        debug!("Rotated audit log {}", self.path.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::new(&path);

        log.record("alice", "server:restart", "server", "succeeded", Some("op-1"))
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(value["actor"], "alice");
        assert_eq!(value["result"], "succeeded");
        assert_eq!(value["op_id"], "op-1");
    }

    #[tokio::test]
    async fn test_rotation_keeps_generations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        // Every record is larger than the threshold, so each write rotates.
        let log = AuditLog::with_rotation(&path, 10, 2);

        for i in 0..5 {
            log.record(&format!("actor-{}", i), "server:start", "server", "succeeded", None)
                .await
                .unwrap();
        }

        assert!(path.exists());
        assert!(generation(&path, 1).exists());
        assert!(generation(&path, 2).exists());
        assert!(!generation(&path, 3).exists());

        let current = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(current.contains("actor-4"));
        let previous = tokio::fs::read_to_string(generation(&path, 1)).await.unwrap();
        assert!(previous.contains("actor-3"));
    }
}
