//! Extended status for dashboards.

use crate::gate::GateSnapshot;
use chrono::{DateTime, Utc};
use mcops_common::HealthSnapshot;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    #[serde(flatten)]
    pub health: HealthSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
    pub game_port_listening: bool,
    pub rcon_port_listening: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players_online: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    pub restart_gate: GateSnapshot,
}

impl ServerStatus {
    pub fn uptime(&self) -> Option<Duration> {
        self.uptime_seconds.map(Duration::from_secs)
    }
}
