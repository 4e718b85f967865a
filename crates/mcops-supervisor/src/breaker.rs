//! Circuit breaker for repeated restart failures.
//!
//! The gate's cooldown spaces restarts out, but a server that crashes on
//! every boot would still be restarted every `cooldown` seconds forever.
//! The breaker stops that: after `failure_threshold` failed restarts inside
//! `time_window` it trips and rejects restarts for `cooldown_period`. When
//! the cooldown runs out the breaker goes half-open and the next failure
//! trips it again immediately. A success resets it fully.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Maximum failures before tripping
    failure_threshold: u32,
    /// Time window for counting failures
    time_window: Duration,
    /// Recent failure timestamps
    recent_failures: Vec<DateTime<Utc>>,
    /// When the circuit breaker was tripped
    tripped_at: Option<DateTime<Utc>>,
    /// Tripped once and cooled down; one more failure re-trips.
    half_open: bool,
    /// How long to reject before allowing a retry
    cooldown_period: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, time_window: Duration, cooldown_period: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            time_window,
            recent_failures: Vec::new(),
            tripped_at: None,
            half_open: false,
            cooldown_period,
        }
    }

    /// Record a failure and report whether this failure tripped the breaker.
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_tripped(now) {
            return false;
        }

        self.recent_failures.push(now);
        let window = chrono::Duration::from_std(self.time_window).unwrap_or(chrono::Duration::zero());
        let cutoff = now - window;
        self.recent_failures.retain(|&failure_time| failure_time > cutoff);

        if self.half_open || self.recent_failures.len() >= self.failure_threshold as usize {
            self.tripped_at = Some(now);
            self.half_open = false;
            warn!(
                "Restart circuit breaker tripped: {} failure(s) in {:?} window",
                self.recent_failures.len(),
                self.time_window
            );
            return true;
        }

        false
    }

    /// Record a success: clears failures and closes the breaker.
    pub fn record_success(&mut self) {
        if self.tripped_at.is_some() || self.half_open || !self.recent_failures.is_empty() {
            self.reset();
        }
    }

    /// Check if the breaker currently rejects restarts.
    pub fn is_tripped(&mut self, now: DateTime<Utc>) -> bool {
        match self.tripped_at {
            None => false,
            Some(tripped_at) => {
                let elapsed = (now - tripped_at).to_std().unwrap_or(Duration::ZERO);
                if elapsed >= self.cooldown_period {
                    self.tripped_at = None;
                    self.recent_failures.clear();
                    self.half_open = true;
                    info!("Restart circuit breaker half-open after {:?}", self.cooldown_period);
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Remaining time before a retry is allowed.
    pub fn remaining_cooldown(&self, now: DateTime<Utc>) -> Option<Duration> {
        let tripped_at = self.tripped_at?;
        let elapsed = (now - tripped_at).to_std().unwrap_or(Duration::ZERO);
        self.cooldown_period.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// Reset the circuit breaker (explicit operator action).
    pub fn reset(&mut self) {
        self.tripped_at = None;
        self.half_open = false;
        self.recent_failures.clear();
        info!("Restart circuit breaker reset");
    }

    pub fn failure_count(&self) -> usize {
        self.recent_failures.len()
    }
}
