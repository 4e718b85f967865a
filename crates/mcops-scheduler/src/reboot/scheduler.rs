use super::config::RebootConfig;
use super::state::{RebootState, RebootStatus, RebootTrigger};
use crate::action_log::{ActionLog, ActionLogEntry, EntryStatus};
use crate::activity::{ActivityBoard, SchedulerKind};
use crate::config::{SchedulerPaths, SchedulerTiming};
use crate::driver::Scheduler;
use crate::request::{ManualRequest, RequestSlot};
use crate::store::{load_json, save_json};
use crate::warnings::{describe_remaining, format_duration, Announcement, CountdownPlan};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mcops_common::{SchedulerError, SchedulerResult, StateReason};
use mcops_operations::{
    Actor, OperationOutcome, OperationParams, OperationRegistry, OperationStatus, SERVER_RECOVER,
    SERVER_RESTART,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Restart source recorded by the gate for scheduler restarts.
pub const RESTART_SOURCE: &str = "auto_scheduler";

/// What one tick saw of the server.
struct Observation {
    running: bool,
    degraded: bool,
    players: u32,
    started_at: Option<DateTime<Utc>>,
}

pub struct RebootScheduler {
    registry: Arc<OperationRegistry>,
    board: ActivityBoard,
    timing: SchedulerTiming,
    paths: SchedulerPaths,
    config: Mutex<RebootConfig>,
    status: Mutex<RebootStatus>,
    requests: RequestSlot,
    log: ActionLog,
    tick_lock: tokio::sync::Mutex<()>,
    actor: Actor,
}

impl RebootScheduler {
    /// Load persisted config and status from `paths` and publish the
    /// resulting state on `board`.
    pub async fn open(
        registry: Arc<OperationRegistry>,
        board: ActivityBoard,
        timing: SchedulerTiming,
        paths: SchedulerPaths,
    ) -> SchedulerResult<Self> {
        let config: RebootConfig = load_json(&paths.reboot_config()).await?.unwrap_or_default();
        config.validate()?;

        let mut status = match load_json::<RebootStatus>(&paths.reboot_state()).await {
            Ok(status) => status.unwrap_or_default(),
            Err(e) => {
                warn!("[reboot] Ignoring unreadable state: {}", e);
                RebootStatus::default()
            }
        };
        if !config.enabled {
            status.state = RebootState::Disabled;
            status.clear_cycle();
        }

        let log = ActionLog::open("reboot", paths.reboot_log()).await;
        board.publish(SchedulerKind::Reboot, status.state.as_str(), status.state.is_quiet());
        info!("🔁 Reboot scheduler loaded ({})", status.state);

        Ok(Self {
            registry,
            board,
            timing,
            paths,
            config: Mutex::new(config),
            status: Mutex::new(status),
            requests: RequestSlot::new(),
            log,
            tick_lock: tokio::sync::Mutex::new(()),
            actor: Actor::scheduler("reboot"),
        })
    }

    pub fn config(&self) -> RebootConfig {
        self.config.lock().clone()
    }

    pub fn status(&self) -> RebootStatus {
        self.status.lock().clone()
    }

    pub fn recent_log(&self, limit: usize) -> Vec<ActionLogEntry> {
        self.log.recent(limit)
    }

    /// Replace the thresholds. `enabled` is kept; use [`enable`](Self::enable)
    /// and [`disable`](Self::disable) for that.
    pub async fn update_config(&self, mut config: RebootConfig) -> SchedulerResult<RebootConfig> {
        config.validate()?;
        config.enabled = self.config.lock().enabled;
        *self.config.lock() = config.clone();
        save_json(&self.paths.reboot_config(), &config).await?;
        self.log
            .record(ActionLogEntry::new("config_updated", EntryStatus::Info, "Configuration updated"))
            .await;
        Ok(config)
    }

    pub async fn enable(&self) -> SchedulerResult<()> {
        let config = {
            let mut config = self.config.lock();
            if config.enabled {
                return Ok(());
            }
            config.enabled = true;
            config.clone()
        };
        save_json(&self.paths.reboot_config(), &config).await?;
        self.log
            .record(ActionLogEntry::new("scheduler_enabled", EntryStatus::Info, "Reboot scheduler enabled"))
            .await;
        self.requests.wake();
        Ok(())
    }

    /// Takes effect immediately: the running cycle's token is dropped so
    /// its remaining warnings and the restart call become no-ops.
    pub async fn disable(&self) -> SchedulerResult<()> {
        let config = {
            let mut config = self.config.lock();
            config.enabled = false;
            config.clone()
        };
        let (aborted, in_flight) = {
            let mut status = self.status.lock();
            let aborted = status.current_token.is_some();
            // A restart already handed to the registry finishes inside its
            // tick, which then settles on disabled
            let in_flight = status.state == RebootState::Restarting;
            if in_flight {
                status.current_token = None;
            } else {
                status.state = RebootState::Disabled;
                status.next_action = None;
                status.clear_cycle();
            }
            (aborted, in_flight)
        };
        if !in_flight {
            self.board.publish(SchedulerKind::Reboot, RebootState::Disabled.as_str(), true);
        }
        save_json(&self.paths.reboot_config(), &config).await?;
        self.persist_status().await;

        let details = if aborted {
            "Reboot scheduler disabled, running cycle aborted"
        } else {
            "Reboot scheduler disabled"
        };
        self.log
            .record(ActionLogEntry::new("scheduler_disabled", EntryStatus::Info, details))
            .await;
        Ok(())
    }

    /// Ask the next tick for a restart. With players online it counts down
    /// first; on an empty server it restarts right away.
    pub fn trigger_now(&self, reason: impl Into<String>) -> SchedulerResult<()> {
        if !self.config.lock().enabled {
            return Err(SchedulerError::Rejected("reboot scheduler is disabled".to_string()));
        }
        let state = self.status.lock().state;
        if state.is_countdown() || state == RebootState::Restarting || state == RebootState::Error {
            return Err(SchedulerError::Rejected(format!("already in {} state", state)));
        }
        self.requests.submit(ManualRequest::TriggerNow {
            reason: reason.into(),
        });
        Ok(())
    }

    pub fn cancel_countdown(&self) -> SchedulerResult<()> {
        if !self.status.lock().state.is_countdown() {
            return Err(SchedulerError::Rejected("no countdown active".to_string()));
        }
        self.requests.submit(ManualRequest::CancelCountdown);
        Ok(())
    }

    pub fn clear_error(&self) -> SchedulerResult<()> {
        if self.status.lock().state != RebootState::Error {
            return Err(SchedulerError::Rejected("scheduler is not in error state".to_string()));
        }
        self.requests.submit(ManualRequest::ClearError);
        Ok(())
    }

    /// One tick evaluated at `now`. Returns the delay until the next tick.
    /// A tick that finds another still running is skipped.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Duration {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            debug!("[reboot] Previous tick still running, skipping");
            return self.timing.countdown_tick;
        };

        self.run_tick(now).await;

        let state = {
            let enabled = self.config.lock().enabled;
            let mut status = self.status.lock();
            if !enabled && status.state != RebootState::Disabled {
                status.state = RebootState::Disabled;
                status.next_action = None;
                status.clear_cycle();
            }
            status.state
        };
        self.board.publish(SchedulerKind::Reboot, state.as_str(), state.is_quiet());
        self.persist_status().await;

        if state.is_countdown() {
            self.timing.countdown_tick
        } else {
            self.timing.reboot_interval
        }
    }

    async fn run_tick(&self, now: DateTime<Utc>) {
        let request = self.requests.take();
        let config = self.config();
        self.status.lock().last_check = Some(now);

        if !config.enabled {
            if let Some(request) = request {
                debug!("[reboot] Dropping {:?}: scheduler disabled", request);
            }
            let mut status = self.status.lock();
            status.state = RebootState::Disabled;
            status.next_action = None;
            status.clear_cycle();
            return;
        }

        let state = self.status.lock().state;
        match state {
            RebootState::Error => {
                if request != Some(ManualRequest::ClearError) {
                    return;
                }
                {
                    let mut status = self.status.lock();
                    status.state = RebootState::Monitoring;
                    status.error_message = None;
                    status.empty_since = None;
                    status.degraded_since = None;
                    status.clear_cycle();
                }
                self.log
                    .record(ActionLogEntry::new("error_cleared", EntryStatus::Info, "Error cleared by operator"))
                    .await;
            }
            RebootState::Disabled => self.status.lock().state = RebootState::Monitoring,
            RebootState::Restarting => {
                // Only reachable when loaded from disk: the restart itself
                // finishes within the tick that started it
                self.status.lock().clear_cycle();
                self.status.lock().state = RebootState::Monitoring;
                self.log
                    .record(ActionLogEntry::new(
                        "restart_interrupted",
                        EntryStatus::Info,
                        "Daemon stopped during a restart; resuming monitoring",
                    ))
                    .await;
            }
            _ => {}
        }

        let observed = self.observe().await;

        match request {
            Some(ManualRequest::TriggerNow { reason }) => {
                self.manual_restart(&config, &observed, &reason, now).await;
                return;
            }
            Some(ManualRequest::CancelCountdown) => {
                self.cancel_running_countdown(&observed).await;
                return;
            }
            Some(ManualRequest::ClearError) | None => {}
        }

        if self.status.lock().state.is_countdown() {
            self.handle_countdown(&config, &observed, now).await;
        } else {
            self.monitor(&config, &observed, now).await;
        }
    }

    async fn observe(&self) -> Observation {
        let server = self.registry.server().status().await;
        let observed = Observation {
            running: server.health.process_running,
            degraded: server.health.state_reason == StateReason::ProcessNoPort,
            players: server.players_online.unwrap_or(0),
            started_at: server.started_at,
        };

        let mut status = self.status.lock();
        status.server_running = observed.running;
        status.players_online = if observed.running { observed.players } else { 0 };
        status.server_started_at = observed.started_at.filter(|_| observed.running);
        observed
    }

    async fn monitor(&self, config: &RebootConfig, observed: &Observation, now: DateTime<Utc>) {
        if !observed.running {
            let mut status = self.status.lock();
            status.empty_since = None;
            status.degraded_since = None;
            status.next_action = Some("Waiting for server to start".to_string());
            return;
        }

        if observed.degraded {
            let since = *self.status.lock().degraded_since.get_or_insert(now);
            let waited = (now - since).to_std().unwrap_or_default();
            if waited >= self.timing.degraded_recover_after {
                self.recover_degraded(now).await;
            } else {
                let left = self.timing.degraded_recover_after - waited;
                self.status.lock().next_action = Some(format!(
                    "Server degraded (no game port), recovering in {}",
                    format_duration(left.as_secs() as i64)
                ));
            }
            return;
        }

        let (empty_since, last_restart_at) = {
            let mut status = self.status.lock();
            status.degraded_since = None;
            status.next_action = None;
            if observed.players == 0 {
                status.empty_since.get_or_insert(now);
            } else {
                status.empty_since = None;
            }
            (status.empty_since, status.last_restart_at)
        };

        if config.empty_server_enabled {
            if let Some(empty_since) = empty_since {
                let empty_secs = (now - empty_since).num_seconds();
                let threshold = config.empty_threshold().as_secs() as i64;
                let grace_left = last_restart_at
                    .map(|at| config.grace().as_secs() as i64 - (now - at).num_seconds())
                    .filter(|left| *left > 0);

                if empty_secs < threshold {
                    self.status.lock().next_action = Some(format!(
                        "Empty server restart in {}",
                        format_duration(threshold - empty_secs)
                    ));
                } else if let Some(left) = grace_left {
                    self.status.lock().next_action = Some(format!(
                        "Empty server restart held by grace period ({} left)",
                        format_duration(left)
                    ));
                } else {
                    let details = format!("Server empty for {}", format_duration(empty_secs));
                    self.start_empty_countdown(&details, now).await;
                    return;
                }
            }
        }

        if config.uptime_restart_enabled {
            if let Some(started_at) = observed.started_at {
                let uptime_secs = (now - started_at).num_seconds();
                let max = config.max_uptime().as_secs() as i64;
                if uptime_secs >= max {
                    let details = format!("Server uptime {}", format_duration(uptime_secs));
                    if observed.players > 0 {
                        self.start_countdown(config, RebootTrigger::Uptime, &details, observed.players, now)
                            .await;
                    } else {
                        self.restart_now(RebootTrigger::Uptime, &details, 0, now).await;
                    }
                    return;
                }
                let mut status = self.status.lock();
                if status.next_action.is_none() {
                    status.next_action =
                        Some(format!("Uptime restart in {}", format_duration(max - uptime_secs)));
                }
            }
        }
    }

    async fn manual_restart(
        &self,
        config: &RebootConfig,
        observed: &Observation,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        if !observed.running {
            self.log
                .record(
                    ActionLogEntry::new("manual_restart", EntryStatus::Failed, "Server is not running")
                        .trigger(reason),
                )
                .await;
            return;
        }
        if self.status.lock().state != RebootState::Monitoring {
            debug!("[reboot] Manual restart ignored: a cycle is already running");
            return;
        }

        self.log
            .record(
                ActionLogEntry::new("manual_restart", EntryStatus::Info, "Manual restart requested")
                    .trigger(reason)
                    .players(observed.players),
            )
            .await;
        let details = format!("Manual restart ({})", reason);
        if observed.players > 0 {
            self.start_countdown(config, RebootTrigger::Manual, &details, observed.players, now)
                .await;
        } else {
            self.restart_now(RebootTrigger::Manual, &details, 0, now).await;
        }
    }

    async fn cancel_running_countdown(&self, observed: &Observation) {
        let cancelled = {
            let mut status = self.status.lock();
            if !status.state.is_countdown() {
                false
            } else {
                status.clear_cycle();
                status.state = RebootState::Monitoring;
                status.next_action = None;
                true
            }
        };
        if !cancelled {
            return;
        }

        if observed.running {
            let outcome = self
                .registry
                .server()
                .send_command(Announcement::Restart.cancelled_command())
                .await;
            if !outcome.success {
                debug!("[reboot] Cancel notice not delivered: {:?}", outcome.error);
            }
        }
        self.log
            .record(
                ActionLogEntry::new("countdown_cancelled", EntryStatus::Info, "Countdown cancelled by operator")
                    .players(observed.players),
            )
            .await;
    }

    /// Claim the activity board and mint a token for a new cycle. `None`
    /// when the backup scheduler is busy; the skip is logged.
    async fn begin_cycle(&self, state: RebootState, trigger: RebootTrigger) -> Option<Uuid> {
        if let Err(peer) = self.board.try_claim(SchedulerKind::Reboot, state.as_str()) {
            self.log
                .record(
                    ActionLogEntry::new(
                        "restart_skipped",
                        EntryStatus::Info,
                        format!("Backup scheduler is {}", peer.state),
                    )
                    .trigger(trigger.as_str()),
                )
                .await;
            return None;
        }

        let token = Uuid::new_v4();
        let mut status = self.status.lock();
        status.clear_cycle();
        status.current_token = Some(token);
        status.trigger_reason = Some(trigger);
        status.state = state;
        Some(token)
    }

    /// Still the running cycle, and still enabled.
    fn is_current(&self, token: Uuid) -> bool {
        self.config.lock().enabled && self.status.lock().current_token == Some(token)
    }

    async fn start_countdown(
        &self,
        config: &RebootConfig,
        trigger: RebootTrigger,
        details: &str,
        players: u32,
        now: DateTime<Utc>,
    ) {
        let Some(token) = self.begin_cycle(RebootState::CountdownUptime, trigger).await else {
            return;
        };

        let total = config.countdown().as_secs();
        let plan = CountdownPlan::new(&config.warning_intervals);
        {
            let mut status = self.status.lock();
            status.countdown_ends_at = Some(now + chrono::Duration::seconds(total as i64));
            plan.due(total as i64, &mut status.warnings_sent);
            status.next_action = Some(format!("Restart in {}", format_duration(total as i64)));
        }

        self.log
            .record(
                ActionLogEntry::new(
                    "countdown_started",
                    EntryStatus::Info,
                    format!("Restart countdown started ({}min): {}", config.countdown_minutes, details),
                )
                .trigger(trigger.as_str())
                .players(players),
            )
            .await;
        self.send_warning(token, total).await;
    }

    async fn handle_countdown(&self, config: &RebootConfig, observed: &Observation, now: DateTime<Utc>) {
        let (token, remaining) = {
            let status = self.status.lock();
            (status.current_token, status.countdown_remaining(now))
        };
        let (Some(token), Some(remaining)) = (token, remaining) else {
            let mut status = self.status.lock();
            status.clear_cycle();
            status.state = RebootState::Monitoring;
            return;
        };

        if !observed.running {
            {
                let mut status = self.status.lock();
                status.clear_cycle();
                status.state = RebootState::Monitoring;
            }
            self.log
                .record(ActionLogEntry::new(
                    "countdown_aborted",
                    EntryStatus::Info,
                    "Server went down during the countdown",
                ))
                .await;
            return;
        }

        if remaining <= 0 {
            self.execute_restart(token, now).await;
            return;
        }

        let plan = CountdownPlan::new(&config.warning_intervals);
        let due = {
            let mut status = self.status.lock();
            status.next_action = Some(format!("Restart in {}", format_duration(remaining)));
            plan.due(remaining, &mut status.warnings_sent)
        };
        if let Some(mark) = due {
            self.send_warning(token, mark).await;
        }
    }

    async fn send_warning(&self, token: Uuid, remaining_secs: u64) {
        let remaining = describe_remaining(remaining_secs);
        let server = self.registry.server();
        for command in Announcement::Restart.warning_commands(&remaining) {
            if !self.is_current(token) {
                debug!("[reboot] Stale cycle {}, warning dropped", token);
                return;
            }
            let outcome = server.send_command(&command).await;
            if !outcome.success {
                let error = outcome.error.unwrap_or_else(|| "unknown error".to_string());
                self.log
                    .record(ActionLogEntry::new(
                        "warning_sent",
                        EntryStatus::Failed,
                        format!("Failed to send warning: {}", error),
                    ))
                    .await;
                return;
            }
        }

        let players = self.status.lock().players_online;
        self.log
            .record(
                ActionLogEntry::new(
                    "warning_sent",
                    EntryStatus::Success,
                    format!("Restart warning sent: {}", remaining),
                )
                .players(players),
            )
            .await;
    }

    /// Empty-server trigger. Nobody is online to warn, so the countdown
    /// ends where it starts; it is persisted before the restart so a daemon
    /// stopped in between resumes straight into it.
    async fn start_empty_countdown(&self, details: &str, now: DateTime<Utc>) {
        let Some(token) = self.begin_cycle(RebootState::CountdownEmpty, RebootTrigger::Empty).await else {
            return;
        };
        {
            let mut status = self.status.lock();
            status.countdown_ends_at = Some(now);
            status.next_action = Some("Restarting empty server".to_string());
        }
        self.persist_status().await;
        self.log
            .record(
                ActionLogEntry::new("restart_triggered", EntryStatus::Info, details)
                    .trigger(RebootTrigger::Empty.as_str()),
            )
            .await;
        self.execute_restart(token, now).await;
    }

    /// Restart without a countdown (nobody online to warn).
    async fn restart_now(&self, trigger: RebootTrigger, details: &str, players: u32, now: DateTime<Utc>) {
        let Some(token) = self.begin_cycle(RebootState::Restarting, trigger).await else {
            return;
        };
        self.log
            .record(
                ActionLogEntry::new("restart_triggered", EntryStatus::Info, details)
                    .trigger(trigger.as_str())
                    .players(players),
            )
            .await;
        self.execute_restart(token, now).await;
    }

    async fn execute_restart(&self, token: Uuid, now: DateTime<Utc>) {
        if !self.is_current(token) {
            return;
        }
        let (trigger, players) = {
            let mut status = self.status.lock();
            status.state = RebootState::Restarting;
            status.next_action = Some("Restarting".to_string());
            (status.trigger_reason.unwrap_or(RebootTrigger::Manual), status.players_online)
        };
        self.board.publish(SchedulerKind::Reboot, RebootState::Restarting.as_str(), false);
        self.log
            .record(
                ActionLogEntry::new("restart_started", EntryStatus::Info, format!("Executing restart (reason: {})", trigger.as_str()))
                    .trigger(trigger.as_str())
                    .players(players),
            )
            .await;

        if players > 0 && self.is_current(token) {
            let outcome = self
                .registry
                .server()
                .send_command(Announcement::Restart.final_command())
                .await;
            if !outcome.success {
                debug!("[reboot] Final notice not delivered: {:?}", outcome.error);
            }
            tokio::time::sleep(self.timing.final_message_pause).await;
        }

        if !self.is_current(token) {
            info!("[reboot] Cycle {} superseded before the restart call", token);
            return;
        }

        let params = OperationParams::new().with("source", RESTART_SOURCE);
        let key = format!("reboot-{}", token);
        let result = self
            .registry
            .execute(SERVER_RESTART, &self.actor, params, Some(&key))
            .await;

        match result {
            Ok(outcome) if outcome.success => {
                self.log
                    .record(
                        ActionLogEntry::new(
                            "restart_completed",
                            EntryStatus::Success,
                            format!("Server restart completed (was {})", trigger.as_str()),
                        )
                        .trigger(trigger.as_str())
                        .players(players),
                    )
                    .await;
                let mut status = self.status.lock();
                status.last_restart_at = Some(now);
                status.empty_since = None;
                status.degraded_since = None;
                status.next_action = None;
                drop(status);
                self.finish_cycle(token);
            }
            Ok(outcome) if is_skip(&outcome) => {
                let reason = skip_reason(&outcome);
                self.log
                    .record(
                        ActionLogEntry::new("restart_skipped", EntryStatus::Info, reason)
                            .trigger(trigger.as_str()),
                    )
                    .await;
                self.finish_cycle(token);
            }
            Ok(outcome) => {
                let error = outcome.error.unwrap_or_else(|| "restart failed".to_string());
                self.log
                    .record(
                        ActionLogEntry::new("restart_failed", EntryStatus::Failed, format!("Restart failed: {}", error))
                            .trigger(trigger.as_str())
                            .players(players),
                    )
                    .await;
                self.enter_error(token, error);
            }
            Err(e) => {
                self.log
                    .record(
                        ActionLogEntry::new("restart_skipped", EntryStatus::Info, format!("Registry refused: {}", e))
                            .trigger(trigger.as_str()),
                    )
                    .await;
                self.finish_cycle(token);
            }
        }
    }

    async fn recover_degraded(&self, now: DateTime<Utc>) {
        let Some(token) = self.begin_cycle(RebootState::Restarting, RebootTrigger::Degraded).await else {
            return;
        };
        self.log
            .record(
                ActionLogEntry::new(
                    "recovery_started",
                    EntryStatus::Info,
                    "Server has no game port; running recovery",
                )
                .trigger(RebootTrigger::Degraded.as_str()),
            )
            .await;

        let key = format!("recover-{}", token);
        let result = self
            .registry
            .execute(SERVER_RECOVER, &self.actor, OperationParams::new(), Some(&key))
            .await;

        match result {
            Ok(outcome) if outcome.success => {
                self.log
                    .record(ActionLogEntry::new("recovery_completed", EntryStatus::Success, "Server recovered"))
                    .await;
                {
                    let mut status = self.status.lock();
                    status.last_restart_at = Some(now);
                    status.degraded_since = None;
                    status.empty_since = None;
                }
                self.finish_cycle(token);
            }
            Ok(outcome) if is_skip(&outcome) => {
                self.log
                    .record(ActionLogEntry::new("restart_skipped", EntryStatus::Info, skip_reason(&outcome)))
                    .await;
                self.finish_cycle(token);
            }
            Ok(outcome) => {
                let error = outcome.error.unwrap_or_else(|| "recovery failed".to_string());
                self.log
                    .record(ActionLogEntry::new(
                        "recovery_failed",
                        EntryStatus::Failed,
                        format!("Recovery failed: {}", error),
                    ))
                    .await;
                self.enter_error(token, error);
            }
            Err(e) => {
                self.log
                    .record(ActionLogEntry::new("restart_skipped", EntryStatus::Info, format!("Registry refused: {}", e)))
                    .await;
                self.finish_cycle(token);
            }
        }
    }

    /// Back to monitoring, unless the cycle was superseded meanwhile.
    fn finish_cycle(&self, token: Uuid) {
        let mut status = self.status.lock();
        if status.current_token != Some(token) {
            return;
        }
        status.clear_cycle();
        status.state = RebootState::Monitoring;
    }

    fn enter_error(&self, token: Uuid, message: String) {
        let mut status = self.status.lock();
        if status.current_token != Some(token) {
            return;
        }
        error!("[reboot] Entering error state: {}", message);
        status.clear_cycle();
        status.state = RebootState::Error;
        status.error_message = Some(message);
    }

    async fn persist_status(&self) {
        let status = self.status();
        if let Err(e) = save_json(&self.paths.reboot_state(), &status).await {
            warn!("[reboot] Failed to save state: {}", e);
        }
    }
}

/// Gate rejections and in-flight duplicates mean "not now", not failure.
fn is_skip(outcome: &OperationOutcome) -> bool {
    outcome.is_rejection() || outcome.status == OperationStatus::InProgress
}

fn skip_reason(outcome: &OperationOutcome) -> String {
    match (outcome.error_code, outcome.retry_after_seconds) {
        (Some(code), Some(retry)) => format!("Restart rejected: {} (retry in {}s)", code, retry),
        (Some(code), None) => format!("Restart rejected: {}", code),
        _ => "Restart already in progress".to_string(),
    }
}

#[async_trait]
impl Scheduler for RebootScheduler {
    fn name(&self) -> &'static str {
        "reboot"
    }

    async fn tick(&self) -> Duration {
        self.tick_at(Utc::now()).await
    }

    fn wake_handle(&self) -> Arc<Notify> {
        self.requests.wake_handle()
    }
}
