use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use mcops_common::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_interval_days")]
    pub backup_interval_days: u32,
    /// Local time of day at or after which a due backup starts.
    #[serde(default = "default_backup_hour")]
    pub backup_hour: u32,
    #[serde(default)]
    pub backup_minute: u32,

    #[serde(default = "default_countdown_minutes")]
    pub countdown_minutes: u32,
    #[serde(default = "default_warning_intervals")]
    pub warning_intervals: Vec<u32>,

    /// Folder in remote storage. Empty means not configured: no backups run.
    #[serde(default)]
    pub remote_folder: String,
    /// Newest backups kept remotely; 0 keeps everything.
    #[serde(default = "default_keep")]
    pub keep_remote_backups: usize,

    /// Set by the scheduler after each successful upload.
    #[serde(default)]
    pub last_backup_time: Option<DateTime<Utc>>,

    /// Server directory to archive.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Where archives are written before upload (and kept on failure).
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    #[serde(default = "default_archive_label")]
    pub archive_label: String,
    /// Version put into the archive name, e.g. "paper 1.21.4".
    #[serde(default)]
    pub server_version: Option<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backup_interval_days: default_interval_days(),
            backup_hour: default_backup_hour(),
            backup_minute: 0,
            countdown_minutes: default_countdown_minutes(),
            warning_intervals: default_warning_intervals(),
            remote_folder: String::new(),
            keep_remote_backups: default_keep(),
            last_backup_time: None,
            data_dir: None,
            archive_dir: default_archive_dir(),
            archive_label: default_archive_label(),
            server_version: None,
        }
    }
}

impl BackupConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        let invalid = |msg: String| Err(SchedulerError::InvalidConfig(msg));
        if self.backup_interval_days == 0 {
            return invalid("backup_interval_days must be at least 1".to_string());
        }
        if self.backup_hour > 23 || self.backup_minute > 59 {
            return invalid(format!(
                "backup time {:02}:{:02} is not a time of day",
                self.backup_hour, self.backup_minute
            ));
        }
        if self.countdown_minutes == 0 || self.countdown_minutes > 60 {
            return invalid("countdown_minutes must be between 1 and 60".to_string());
        }
        if let Some(bad) = self
            .warning_intervals
            .iter()
            .find(|m| **m == 0 || **m > self.countdown_minutes)
        {
            return invalid(format!(
                "warning interval {} is outside 1..={} minutes",
                bad, self.countdown_minutes
            ));
        }
        if self.remote_folder.contains(|c: char| c == '/' || c == '\\') || self.remote_folder == ".." {
            return invalid(format!("remote_folder '{}' must be a plain name", self.remote_folder));
        }
        if self.archive_label.trim().is_empty() {
            return invalid("archive_label must not be empty".to_string());
        }
        Ok(())
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(u64::from(self.countdown_minutes) * 60)
    }

    /// At or past the time of day, and at least the interval since the
    /// last backup (or never backed up).
    pub fn is_due<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        if (now.hour(), now.minute()) < (self.backup_hour, self.backup_minute) {
            return false;
        }
        match self.last_backup_time {
            Some(last) => {
                let elapsed = now.with_timezone(&Utc) - last;
                elapsed.num_seconds() >= i64::from(self.backup_interval_days) * 86_400
            }
            None => true,
        }
    }

    /// When the next backup is expected to start, seen from `now`.
    pub fn next_backup_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Utc>> {
        let tz = now.timezone();
        let at_backup_time = |date: NaiveDate| -> Option<DateTime<Utc>> {
            let naive = date.and_hms_opt(self.backup_hour, self.backup_minute, 0)?;
            tz.from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
        };
        let now_utc = now.with_timezone(&Utc);

        match self.last_backup_time {
            Some(last) => {
                let date = last.with_timezone(&tz).date_naive()
                    + chrono::Duration::days(i64::from(self.backup_interval_days));
                let next = at_backup_time(date)?;
                // Overdue: the next check picks it up
                Some(next.max(now_utc))
            }
            None => {
                let today = at_backup_time(now.date_naive())?;
                if today >= now_utc {
                    Some(today)
                } else {
                    at_backup_time(now.date_naive().succ_opt()?)
                }
            }
        }
    }
}

fn default_interval_days() -> u32 {
    7
}

fn default_backup_hour() -> u32 {
    5
}

fn default_countdown_minutes() -> u32 {
    5
}

fn default_warning_intervals() -> Vec<u32> {
    vec![5, 3, 1]
}

fn default_keep() -> usize {
    10
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_archive_label() -> String {
    "minecraft_server".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config: BackupConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BackupConfig::default());
        assert_eq!(config.backup_interval_days, 7);
        assert_eq!(config.keep_remote_backups, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_due_needs_time_of_day_and_interval() {
        let mut config = BackupConfig {
            backup_hour: 5,
            backup_minute: 30,
            ..BackupConfig::default()
        };
        assert!(!config.is_due(&utc(2026, 2, 8, 5, 29)));
        assert!(config.is_due(&utc(2026, 2, 8, 5, 30)));
        assert!(config.is_due(&utc(2026, 2, 8, 23, 0)));

        config.last_backup_time = Some(utc(2026, 2, 8, 5, 30));
        assert!(!config.is_due(&utc(2026, 2, 14, 6, 0)));
        assert!(config.is_due(&utc(2026, 2, 15, 5, 30)));
    }

    #[test]
    fn test_next_backup_at() {
        let mut config = BackupConfig::default();
        assert_eq!(config.next_backup_at(&utc(2026, 2, 8, 4, 0)), Some(utc(2026, 2, 8, 5, 0)));
        assert_eq!(config.next_backup_at(&utc(2026, 2, 8, 6, 0)), Some(utc(2026, 2, 9, 5, 0)));

        config.last_backup_time = Some(utc(2026, 2, 8, 5, 2));
        assert_eq!(config.next_backup_at(&utc(2026, 2, 9, 0, 0)), Some(utc(2026, 2, 15, 5, 0)));
        // Overdue
        assert_eq!(config.next_backup_at(&utc(2026, 3, 1, 0, 0)), Some(utc(2026, 3, 1, 0, 0)));
    }

    #[test]
    fn test_validate() {
        let config = BackupConfig {
            backup_hour: 24,
            ..BackupConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BackupConfig {
            remote_folder: "../elsewhere".to_string(),
            ..BackupConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
