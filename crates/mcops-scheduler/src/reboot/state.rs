use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebootState {
    #[default]
    Disabled,
    Monitoring,
    CountdownEmpty,
    CountdownUptime,
    Restarting,
    Error,
}

impl RebootState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Monitoring => "monitoring",
            Self::CountdownEmpty => "countdown_empty",
            Self::CountdownUptime => "countdown_uptime",
            Self::Restarting => "restarting",
            Self::Error => "error",
        }
    }

    /// The backup scheduler may act while the reboot scheduler is here.
    pub fn is_quiet(&self) -> bool {
        matches!(self, Self::Disabled | Self::Monitoring)
    }

    pub fn is_countdown(&self) -> bool {
        matches!(self, Self::CountdownEmpty | Self::CountdownUptime)
    }
}

impl fmt::Display for RebootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a restart cycle started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebootTrigger {
    Empty,
    Uptime,
    Manual,
    /// Process alive without its game port.
    Degraded,
}

impl RebootTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Uptime => "uptime",
            Self::Manual => "manual",
            Self::Degraded => "degraded",
        }
    }
}

/// Live status, persisted after every tick so a daemon restart resumes
/// where it left off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebootStatus {
    pub state: RebootState,
    #[serde(default)]
    pub server_running: bool,
    #[serde(default)]
    pub players_online: u32,
    #[serde(default)]
    pub server_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub empty_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub degraded_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub countdown_ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_reason: Option<RebootTrigger>,
    #[serde(default)]
    pub last_restart_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_action: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Token of the running cycle. Steps of an older cycle see a mismatch
    /// and do nothing.
    #[serde(default)]
    pub current_token: Option<Uuid>,
    /// Countdown marks (seconds) already announced.
    #[serde(default)]
    pub warnings_sent: BTreeSet<u64>,
}

impl RebootStatus {
    /// Seconds left on the countdown at `now`, if one is running.
    pub fn countdown_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.countdown_ends_at
            .filter(|_| self.state.is_countdown())
            .map(|ends| (ends - now).num_seconds().max(0))
    }

    pub(crate) fn clear_cycle(&mut self) {
        self.current_token = None;
        self.countdown_ends_at = None;
        self.trigger_reason = None;
        self.warnings_sent.clear();
    }
}
