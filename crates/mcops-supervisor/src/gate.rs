//! Restart dedup/cooldown gate.
//!
//! One gate instance is shared by every path that can restart the server
//! (admin UI, staff UI, both schedulers, recovery). It answers a single
//! question atomically: *may a restart begin now?*
//!
//! | Gate state                         | `try_acquire` result          |
//! |------------------------------------|-------------------------------|
//! | restart in flight                  | `restart_in_progress`         |
//! | breaker tripped                    | `restart_circuit_open` + wait |
//! | last completion < cooldown ago     | `restart_cooldown` + wait     |
//! | otherwise                          | [`RestartPermit`]             |
//!
//! A permit is finished with [`RestartPermit::complete`]. Success or
//! failure both stamp the cooldown so a failing restart cannot hot-loop.
//! A permit dropped without completing counts as a failure, so a panic or
//! a cancelled task never leaves the gate stuck `in_progress`.

use crate::breaker::CircuitBreaker;
use chrono::{DateTime, Utc};
use mcops_common::{duration_serde, ActionOutcome, ErrorCode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_cooldown", with = "duration_serde")]
    pub cooldown: Duration,
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    #[serde(default = "default_breaker_window", with = "duration_serde")]
    pub breaker_window: Duration,
    #[serde(default = "default_breaker_cooldown", with = "duration_serde")]
    pub breaker_cooldown: Duration,
}

fn default_cooldown() -> Duration {
    Duration::from_secs(120)
}

fn default_breaker_threshold() -> u32 {
    3
}

fn default_breaker_window() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_breaker_cooldown() -> Duration {
    Duration::from_secs(30 * 60)
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown(),
            breaker_threshold: default_breaker_threshold(),
            breaker_window: default_breaker_window(),
            breaker_cooldown: default_breaker_cooldown(),
        }
    }
}

/// How strictly an acquisition is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Regular restart: in-progress, breaker and cooldown all apply.
    Restart,
    /// Incident recovery: only mutual exclusion applies.
    Exclusive,
}

/// Why a restart was not allowed to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateRejection {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_restart_source: Option<String>,
}

impl GateRejection {
    pub fn into_outcome(self) -> ActionOutcome {
        let mut outcome = ActionOutcome::failed(self.code, self.message);
        outcome.retry_after_seconds = self.retry_after_seconds;
        outcome.last_restart_source = self.last_restart_source;
        outcome
    }
}

/// Read-only view for status pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateSnapshot {
    pub in_progress: bool,
    pub current_source: Option<String>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub last_source: Option<String>,
    pub last_success: Option<bool>,
    pub breaker_tripped: bool,
}

#[derive(Debug)]
struct GateState {
    in_progress: bool,
    current_source: Option<String>,
    last_completed_at: Option<DateTime<Utc>>,
    last_source: Option<String>,
    last_success: Option<bool>,
    breaker: CircuitBreaker,
}

/// Shared restart gate. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct RestartGate {
    state: Arc<Mutex<GateState>>,
    cooldown: Duration,
}

fn ceil_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

impl RestartGate {
    pub fn new(config: GateConfig) -> Self {
        let breaker = CircuitBreaker::new(
            config.breaker_threshold,
            config.breaker_window,
            config.breaker_cooldown,
        );
        Self {
            state: Arc::new(Mutex::new(GateState {
                in_progress: false,
                current_source: None,
                last_completed_at: None,
                last_source: None,
                last_success: None,
                breaker,
            })),
            cooldown: config.cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn try_acquire(&self, source: &str) -> Result<RestartPermit, GateRejection> {
        self.try_acquire_at(source, AcquireMode::Restart, Utc::now())
    }

    pub fn try_acquire_exclusive(&self, source: &str) -> Result<RestartPermit, GateRejection> {
        self.try_acquire_at(source, AcquireMode::Exclusive, Utc::now())
    }

    /// Check-and-transition `idle -> in_progress` under one lock.
    pub fn try_acquire_at(
        &self,
        source: &str,
        mode: AcquireMode,
        now: DateTime<Utc>,
    ) -> Result<RestartPermit, GateRejection> {
        let mut state = self.state.lock();

        if state.in_progress {
            debug!(
                "Restart from {} rejected: {:?} already restarting",
                source, state.current_source
            );
            return Err(GateRejection {
                code: ErrorCode::RestartInProgress,
                message: "Restart already in progress".to_string(),
                retry_after_seconds: None,
                last_restart_source: state.current_source.clone(),
            });
        }

        if mode == AcquireMode::Restart {
            if state.breaker.is_tripped(now) {
                let wait = state
                    .breaker
                    .remaining_cooldown(now)
                    .map(ceil_seconds)
                    .unwrap_or(1)
                    .max(1);
                return Err(GateRejection {
                    code: ErrorCode::RestartCircuitOpen,
                    message: format!(
                        "Restarts suspended after repeated failures. Retry after {}s",
                        wait
                    ),
                    retry_after_seconds: Some(wait),
                    last_restart_source: state.last_source.clone(),
                });
            }

            if let Some(last) = state.last_completed_at {
                let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
                if elapsed < self.cooldown {
                    let wait = ceil_seconds(self.cooldown - elapsed).max(1);
                    return Err(GateRejection {
                        code: ErrorCode::RestartCooldown,
                        message: format!("Restart cooldown active. Retry after {}s", wait),
                        retry_after_seconds: Some(wait),
                        last_restart_source: state.last_source.clone(),
                    });
                }
            }
        }

        state.in_progress = true;
        state.current_source = Some(source.to_string());
        info!("Restart gate acquired by {}", source);

        Ok(RestartPermit {
            gate: self.clone(),
            source: source.to_string(),
            finished: false,
        })
    }

    fn finish(&self, source: &str, outcome: Option<bool>, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.in_progress = false;
        state.current_source = None;

        let Some(success) = outcome else {
            debug!("Restart gate released unused by {}", source);
            return;
        };

        state.last_completed_at = Some(now);
        state.last_source = Some(source.to_string());
        state.last_success = Some(success);
        if success {
            state.breaker.record_success();
            info!("Restart gate released by {} (success)", source);
        } else {
            let tripped = state.breaker.record_failure(now);
            warn!(
                "Restart gate released by {} (failure{})",
                source,
                if tripped { ", circuit breaker tripped" } else { "" }
            );
        }
    }

    /// Operator action: clear a tripped breaker.
    pub fn reset_breaker(&self) {
        self.state.lock().breaker.reset();
    }

    pub fn snapshot(&self) -> GateSnapshot {
        let mut state = self.state.lock();
        let breaker_tripped = state.breaker.is_tripped(Utc::now());
        GateSnapshot {
            in_progress: state.in_progress,
            current_source: state.current_source.clone(),
            last_completed_at: state.last_completed_at,
            last_source: state.last_source.clone(),
            last_success: state.last_success,
            breaker_tripped,
        }
    }
}

/// Proof that the holder is the single in-flight restart.
#[derive(Debug)]
pub struct RestartPermit {
    gate: RestartGate,
    source: String,
    finished: bool,
}

impl RestartPermit {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Record the outcome and stamp the cooldown.
    pub fn complete(self, success: bool) {
        self.complete_at(success, Utc::now());
    }

    pub fn complete_at(mut self, success: bool, now: DateTime<Utc>) {
        self.finished = true;
        self.gate.finish(&self.source, Some(success), now);
    }

    /// Release without stamping: nothing was restarted.
    pub fn release(mut self) {
        self.finished = true;
        self.gate.finish(&self.source, None, Utc::now());
    }
}

impl Drop for RestartPermit {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Restart permit for {} dropped without completion", self.source);
            self.gate.finish(&self.source, Some(false), Utc::now());
        }
    }
}
