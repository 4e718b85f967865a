//! Console entries and tail status.

use chrono::{DateTime, Local, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref LINE_TIME: Regex = Regex::new(r"^\[(\d{2}:\d{2}:\d{2})").expect("invalid line time pattern");
}

/// Lines that flood the console on every status poll.
pub const NOISE_PATTERNS: &[&str] = &["Thread RCON Client", "Rcon issued server command: /list"];

pub fn is_noise(message: &str) -> bool {
    NOISE_PATTERNS.iter().any(|pattern| message.contains(pattern))
}

/// Events the tailer records itself, between server lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    ServerStarted,
    ServerStopped,
    ServerRestarted,
    LogRotated,
    Reattached,
}

impl Marker {
    pub fn message(&self) -> &'static str {
        match self {
            Self::ServerStarted => "[mcops] Server process started",
            Self::ServerStopped => "[mcops] Server process stopped",
            Self::ServerRestarted => "[mcops] Server restarted",
            Self::LogRotated => "[mcops] Log file rotated - new server session",
            Self::Reattached => "[mcops] Daemon restarted - reattached to server console",
        }
    }
}

/// One console line, or a marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    /// `HH:MM:SS`, from the line itself when it carries one.
    pub time: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<Marker>,
}

impl ConsoleEntry {
    /// Entry for a line that already had color codes removed.
    pub fn line(message: impl Into<String>) -> Self {
        let message = message.into();
        let time = LINE_TIME
            .captures(&message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(now_hms);
        Self {
            time,
            message,
            marker: None,
        }
    }

    pub fn marker(marker: Marker) -> Self {
        Self {
            time: now_hms(),
            message: marker.message().to_string(),
            marker: Some(marker),
        }
    }

    pub fn is_noise(&self) -> bool {
        self.marker.is_none() && is_noise(&self.message)
    }
}

fn now_hms() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailStatus {
    pub active: bool,
    pub lines_read: u64,
    pub bytes_read: u64,
    pub rotations: u64,
    pub buffered: usize,
    pub last_activity: Option<DateTime<Utc>>,
}
