//! Per-scheduler action log.
//!
//! Keeps the newest [`MAX_ENTRIES`] entries in memory and rewrites the JSON
//! file after every entry. This is an operator-facing history; the durable
//! record of operations is the registry trace.

use crate::store::{load_json, save_json};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{info, warn};

pub const MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Success,
    Failed,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub status: EntryStatus,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_reason: Option<String>,
    #[serde(default)]
    pub players_affected: u32,
}

impl ActionLogEntry {
    pub fn new(action: &str, status: EntryStatus, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.to_string(),
            status,
            details: details.into(),
            trigger_reason: None,
            players_affected: 0,
        }
    }

    pub fn trigger(mut self, reason: &str) -> Self {
        self.trigger_reason = Some(reason.to_string());
        self
    }

    pub fn players(mut self, players: u32) -> Self {
        self.players_affected = players;
        self
    }
}

#[derive(Debug)]
pub struct ActionLog {
    scheduler: &'static str,
    path: PathBuf,
    entries: Mutex<VecDeque<ActionLogEntry>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl ActionLog {
    /// Open the log at `path`, keeping what a previous run wrote.
    pub async fn open(scheduler: &'static str, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries: VecDeque<ActionLogEntry> = match load_json::<Vec<ActionLogEntry>>(&path).await {
            Ok(Some(entries)) => {
                let skip = entries.len().saturating_sub(MAX_ENTRIES);
                entries.into_iter().skip(skip).collect()
            }
            Ok(None) => VecDeque::new(),
            Err(e) => {
                warn!("[{}] Starting with an empty action log: {}", scheduler, e);
                VecDeque::new()
            }
        };
        Self {
            scheduler,
            path,
            entries: Mutex::new(entries),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn record(&self, entry: ActionLogEntry) {
        info!(
            "[{}] {}: {} ({:?})",
            self.scheduler, entry.action, entry.details, entry.status
        );

        let _guard = self.write_lock.lock().await;
        let snapshot: Vec<ActionLogEntry> = {
            let mut entries = self.entries.lock();
            entries.push_back(entry);
            while entries.len() > MAX_ENTRIES {
                entries.pop_front();
            }
            entries.iter().cloned().collect()
        };
        if let Err(e) = save_json(&self.path, &snapshot).await {
            warn!("[{}] Failed to save action log: {}", self.scheduler, e);
        }
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<ActionLogEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Newest entry with this action name.
    pub fn last(&self, action: &str) -> Option<ActionLogEntry> {
        self.entries.lock().iter().rev().find(|e| e.action == action).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keeps_newest_entries_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reboot_scheduler_log.json");

        let log = ActionLog::open("reboot", &path).await;
        for i in 0..(MAX_ENTRIES + 5) {
            log.record(ActionLogEntry::new("warning_sent", EntryStatus::Success, format!("#{}", i)))
                .await;
        }
        assert_eq!(log.len(), MAX_ENTRIES);
        assert_eq!(log.recent(1)[0].details, format!("#{}", MAX_ENTRIES + 4));

        let reopened = ActionLog::open("reboot", &path).await;
        assert_eq!(reopened.len(), MAX_ENTRIES);
        assert_eq!(reopened.recent(MAX_ENTRIES).last().unwrap().details, "#5");
    }

    #[tokio::test]
    async fn test_entry_builder_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActionLog::open("backup", dir.path().join("log.json")).await;
        log.record(
            ActionLogEntry::new("restart_started", EntryStatus::Info, "Executing restart")
                .trigger("uptime")
                .players(4),
        )
        .await;

        let entry = log.last("restart_started").unwrap();
        assert_eq!(entry.trigger_reason.as_deref(), Some("uptime"));
        assert_eq!(entry.players_affected, 4);
        assert!(log.last("restart_failed").is_none());
    }
}
