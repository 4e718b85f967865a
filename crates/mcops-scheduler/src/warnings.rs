//! Countdown warnings shown to players.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Extra marks (seconds) after the configured minute marks.
const FINAL_MARKS: [u64; 2] = [30, 10];

/// Marks at which a countdown announces itself, in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownPlan {
    marks: Vec<u64>,
}

impl CountdownPlan {
    pub fn new(warning_minutes: &[u32]) -> Self {
        let mut marks: Vec<u64> = warning_minutes
            .iter()
            .filter(|m| **m > 0)
            .map(|m| u64::from(*m) * 60)
            .chain(FINAL_MARKS)
            .collect();
        marks.sort_unstable_by(|a, b| b.cmp(a));
        marks.dedup();
        Self { marks }
    }

    pub fn marks(&self) -> &[u64] {
        &self.marks
    }

    /// Marks reached at `remaining_secs` and not yet announced. All of them
    /// are recorded in `sent`; only the smallest is returned so a late tick
    /// announces the time actually left instead of a stale mark.
    pub fn due(&self, remaining_secs: i64, sent: &mut BTreeSet<u64>) -> Option<u64> {
        let remaining = remaining_secs.max(0) as u64;
        let mut due = None;
        for mark in &self.marks {
            if remaining <= *mark && sent.insert(*mark) {
                due = Some(*mark);
            }
        }
        due
    }
}

/// "5 minutes", "1 minute", "30 seconds".
pub fn describe_remaining(secs: u64) -> String {
    if secs >= 60 {
        let minutes = secs / 60;
        format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        format!("{} seconds", secs)
    }
}

/// Compact duration for status lines: "45s", "3m 20s", "2h 5m".
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Which maintenance is being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Announcement {
    Restart,
    Backup,
}

impl Announcement {
    /// Title, subtitle and chat line for one warning.
    pub fn warning_commands(&self, remaining: &str) -> Vec<String> {
        match self {
            Self::Restart => vec![
                r#"title @a title {"text":"⚠ SERVER RESTART","color":"gold","bold":true}"#.to_string(),
                format!(r#"title @a subtitle {{"text":"in {}","color":"yellow"}}"#, remaining),
                format!(
                    "say §6[Auto-Restart] §eServer will restart in {}. Please find a safe spot!",
                    remaining
                ),
            ],
            Self::Backup => vec![
                r#"title @a title {"text":"☁ SERVER BACKUP","color":"aqua","bold":true}"#.to_string(),
                format!(
                    r#"title @a subtitle {{"text":"shutting down in {}","color":"yellow"}}"#,
                    remaining
                ),
                format!(
                    "say §b[Auto-Backup] §eServer will shut down for backup in {}. Please find a safe spot!",
                    remaining
                ),
            ],
        }
    }

    pub fn final_command(&self) -> &'static str {
        match self {
            Self::Restart => "say §c[Auto-Restart] §fRestarting now! See you soon!",
            Self::Backup => "say §c[Auto-Backup] §fShutting down now for backup. See you soon!",
        }
    }

    pub fn cancelled_command(&self) -> &'static str {
        match self {
            Self::Restart => "say §a[Auto-Restart] §fRestart has been cancelled!",
            Self::Backup => "say §a[Auto-Backup] §fBackup has been cancelled!",
        }
    }
}
