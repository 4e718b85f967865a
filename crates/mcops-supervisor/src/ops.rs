//! ServerOps trait - what callers above the supervisor may do
//!
//! The operation registry and both schedulers depend on this trait rather
//! than on [`Supervisor`](crate::Supervisor) so they can be tested against
//! scripted fakes.

use crate::status::ServerStatus;
use async_trait::async_trait;
use mcops_common::{ActionOutcome, HealthSnapshot, RecoveryTrace};
use mcops_rcon::PlayerCount;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of one restart. Unset fields use the supervisor's timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartRequest {
    pub source: String,
    #[serde(default)]
    pub ready_timeout: Option<Duration>,
    #[serde(default)]
    pub start_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay: Option<Duration>,
}

impl RestartRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ready_timeout: None,
            start_retries: None,
            retry_delay: None,
        }
    }
}

#[async_trait]
pub trait ServerOps: Send + Sync {
    async fn health(&self) -> HealthSnapshot;

    async fn status(&self) -> ServerStatus;

    async fn start(&self) -> ActionOutcome;

    async fn stop(&self, force: bool) -> ActionOutcome;

    /// Gated restart. Rejections come back as outcomes carrying
    /// `restart_in_progress`, `restart_cooldown` or `restart_circuit_open`.
    async fn restart(&self, request: RestartRequest) -> ActionOutcome;

    async fn recover(&self) -> RecoveryTrace;

    async fn send_command(&self, command: &str) -> ActionOutcome;

    /// Chat message to every online player.
    async fn broadcast(&self, message: &str) -> ActionOutcome {
        self.send_command(&format!("say {}", message)).await
    }

    /// Online/max players, `None` when the server is down or unreachable.
    async fn player_count(&self) -> Option<PlayerCount>;
}
