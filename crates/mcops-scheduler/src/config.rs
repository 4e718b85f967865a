//! Daemon-level scheduler settings.
//!
//! These come from the daemon configuration file. The per-scheduler
//! configs (`RebootConfig`, `BackupConfig`) are separate: operators change
//! them at runtime and they are persisted as JSON under `state_dir`.

use mcops_common::duration_serde;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Directory for persisted scheduler config, state and action logs.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub timing: SchedulerTiming,

    /// Backup upload target. Backups never trigger while this is unset.
    #[serde(default)]
    pub storage: Option<StorageSettings>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            timing: SchedulerTiming::default(),
            storage: None,
        }
    }
}

impl SchedulerSettings {
    pub fn paths(&self) -> SchedulerPaths {
        SchedulerPaths::new(&self.state_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Mounted remote folder backups are copied into.
    pub remote_dir: PathBuf,
    /// Service-account credentials JSON.
    pub credentials_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerTiming {
    #[serde(default = "default_reboot_interval", with = "duration_serde")]
    pub reboot_interval: Duration,
    #[serde(default = "default_backup_interval", with = "duration_serde")]
    pub backup_interval: Duration,
    /// Tick interval while a countdown runs.
    #[serde(default = "default_countdown_tick", with = "duration_serde")]
    pub countdown_tick: Duration,
    /// Pause after the final "now" message so players can read it.
    #[serde(default = "default_final_message_pause", with = "duration_serde")]
    pub final_message_pause: Duration,
    /// How long a backup waits for the server process to go away.
    #[serde(default = "default_stop_wait", with = "duration_serde")]
    pub stop_wait: Duration,
    #[serde(default = "default_stop_poll", with = "duration_serde")]
    pub stop_poll: Duration,
    /// A process without a game port for this long gets `server:recover`.
    #[serde(default = "default_degraded_recover_after", with = "duration_serde")]
    pub degraded_recover_after: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            reboot_interval: default_reboot_interval(),
            backup_interval: default_backup_interval(),
            countdown_tick: default_countdown_tick(),
            final_message_pause: default_final_message_pause(),
            stop_wait: default_stop_wait(),
            stop_poll: default_stop_poll(),
            degraded_recover_after: default_degraded_recover_after(),
        }
    }
}

impl SchedulerTiming {
    /// No pauses; for tests that drive ticks by hand.
    pub fn immediate() -> Self {
        Self {
            final_message_pause: Duration::ZERO,
            stop_wait: Duration::from_secs(2),
            stop_poll: Duration::from_millis(10),
            ..Self::default()
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_reboot_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_backup_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_countdown_tick() -> Duration {
    Duration::from_secs(1)
}

fn default_final_message_pause() -> Duration {
    Duration::from_secs(2)
}

fn default_stop_wait() -> Duration {
    Duration::from_secs(60)
}

fn default_stop_poll() -> Duration {
    Duration::from_secs(1)
}

fn default_degraded_recover_after() -> Duration {
    Duration::from_secs(180)
}

/// File locations under the state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerPaths {
    dir: PathBuf,
}

impl SchedulerPaths {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn reboot_config(&self) -> PathBuf {
        self.dir.join("reboot_scheduler_config.json")
    }

    pub fn reboot_state(&self) -> PathBuf {
        self.dir.join("reboot_scheduler_state.json")
    }

    pub fn reboot_log(&self) -> PathBuf {
        self.dir.join("reboot_scheduler_log.json")
    }

    pub fn backup_config(&self) -> PathBuf {
        self.dir.join("backup_scheduler_config.json")
    }

    pub fn backup_state(&self) -> PathBuf {
        self.dir.join("backup_scheduler_state.json")
    }

    pub fn backup_log(&self) -> PathBuf {
        self.dir.join("backup_scheduler_log.json")
    }
}
