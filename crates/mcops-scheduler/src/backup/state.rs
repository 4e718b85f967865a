use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupState {
    #[default]
    Disabled,
    Monitoring,
    Countdown,
    StoppingServer,
    Compressing,
    Uploading,
    Restarting,
    Error,
}

impl BackupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Monitoring => "monitoring",
            Self::Countdown => "countdown",
            Self::StoppingServer => "stopping_server",
            Self::Compressing => "compressing",
            Self::Uploading => "uploading",
            Self::Restarting => "restarting",
            Self::Error => "error",
        }
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self, Self::Disabled | Self::Monitoring)
    }

    /// States that only exist while a pipeline runs inside a tick.
    pub fn is_pipeline(&self) -> bool {
        matches!(
            self,
            Self::StoppingServer | Self::Compressing | Self::Uploading | Self::Restarting
        )
    }
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupStatus {
    pub state: BackupState,
    #[serde(default)]
    pub current_operation: String,
    #[serde(default)]
    pub progress_percent: u8,
    #[serde(default)]
    pub players_online: u32,
    #[serde(default)]
    pub countdown_ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub countdown_remaining_seconds: u64,
    #[serde(default)]
    pub next_backup_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_backup_size_mb: Option<f64>,
    #[serde(default)]
    pub last_duration_seconds: Option<u64>,
    #[serde(default)]
    pub last_remote_name: Option<String>,
    /// Local archive left behind by a failed cycle.
    #[serde(default)]
    pub kept_archive: Option<PathBuf>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub current_token: Option<Uuid>,
    #[serde(default)]
    pub warnings_sent: BTreeSet<u64>,
    /// Whether the running cycle stopped the server (and so must start it).
    #[serde(default)]
    pub server_was_running: bool,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
}

impl BackupStatus {
    pub(crate) fn clear_cycle(&mut self) {
        self.current_token = None;
        self.countdown_ends_at = None;
        self.countdown_remaining_seconds = 0;
        self.warnings_sent.clear();
        self.server_was_running = false;
    }
}
