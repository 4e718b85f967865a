use mcops_common::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operator-editable settings, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebootConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub empty_server_enabled: bool,
    #[serde(default = "default_empty_hours")]
    pub empty_hours_threshold: f64,

    #[serde(default = "default_true")]
    pub uptime_restart_enabled: bool,
    #[serde(default = "default_max_uptime_hours")]
    pub max_uptime_hours: f64,

    #[serde(default = "default_countdown_minutes")]
    pub countdown_minutes: u32,
    /// Minutes before the restart at which players are warned.
    #[serde(default = "default_warning_intervals")]
    pub warning_intervals: Vec<u32>,

    /// No empty-server restart this soon after the previous restart.
    #[serde(default = "default_grace_minutes")]
    pub restart_grace_minutes: u32,
}

impl Default for RebootConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            empty_server_enabled: true,
            empty_hours_threshold: default_empty_hours(),
            uptime_restart_enabled: true,
            max_uptime_hours: default_max_uptime_hours(),
            countdown_minutes: default_countdown_minutes(),
            warning_intervals: default_warning_intervals(),
            restart_grace_minutes: default_grace_minutes(),
        }
    }
}

impl RebootConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if !(self.empty_hours_threshold.is_finite() && self.empty_hours_threshold > 0.0) {
            return Err(SchedulerError::InvalidConfig(
                "empty_hours_threshold must be a positive number of hours".to_string(),
            ));
        }
        if !(self.max_uptime_hours.is_finite() && self.max_uptime_hours > 0.0) {
            return Err(SchedulerError::InvalidConfig(
                "max_uptime_hours must be a positive number of hours".to_string(),
            ));
        }
        if self.countdown_minutes == 0 || self.countdown_minutes > 60 {
            return Err(SchedulerError::InvalidConfig(
                "countdown_minutes must be between 1 and 60".to_string(),
            ));
        }
        if let Some(bad) = self
            .warning_intervals
            .iter()
            .find(|m| **m == 0 || **m > self.countdown_minutes)
        {
            return Err(SchedulerError::InvalidConfig(format!(
                "warning interval {} is outside 1..={} minutes",
                bad, self.countdown_minutes
            )));
        }
        Ok(())
    }

    pub fn empty_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.empty_hours_threshold * 3600.0)
    }

    pub fn max_uptime(&self) -> Duration {
        Duration::from_secs_f64(self.max_uptime_hours * 3600.0)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(u64::from(self.countdown_minutes) * 60)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(u64::from(self.restart_grace_minutes) * 60)
    }
}

fn default_true() -> bool {
    true
}

fn default_empty_hours() -> f64 {
    6.0
}

fn default_max_uptime_hours() -> f64 {
    12.0
}

fn default_countdown_minutes() -> u32 {
    5
}

fn default_warning_intervals() -> Vec<u32> {
    vec![5, 3, 1]
}

fn default_grace_minutes() -> u32 {
    30
}
