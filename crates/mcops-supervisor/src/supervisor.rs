//! Process supervisor for the game server.
//!
//! All lifecycle mutation (start, stop, restart, recover) runs under one
//! async mutex, so only one of them touches the process or the PID file at
//! a time. `health()` and `status()` never take that lock. The only thing
//! they may write is the PID file, when a process scan finds a running
//! server that the file does not point at.
//!
//! Restarts take the shared [`RestartGate`] *before* the mutation lock. A
//! second restart therefore gets `restart_in_progress` immediately instead
//! of queueing behind the first one.

use crate::config::SupervisorConfig;
use crate::gate::RestartGate;
use crate::ops::{RestartRequest, ServerOps};
use crate::runtime::{OsRuntime, ServerRuntime};
use crate::status::ServerStatus;
use async_trait::async_trait;
use chrono::Utc;
use mcops_common::{
    ActionOutcome, ErrorCode, HealthSignals, HealthSnapshot, ProcessError, RconError, ReadyChecks,
    RecoveryStep, RecoveryStepKind, RecoveryTrace, StepStatus, StopMethod,
};
use mcops_process::{PidFile, PidFileState, StopSignal};
use mcops_rcon::{parse_player_list, strip_color_codes, PlayerCount};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// What the supervisor launched last.
#[derive(Debug, Default)]
struct ProcessHandle {
    pid: Option<u32>,
}

/// PID file cross-checked against the OS.
#[derive(Debug, Clone, Copy)]
struct ProcessSnapshot {
    running: bool,
    pid: Option<u32>,
    stale_pid: bool,
}

/// Why readiness polling gave up.
struct ReadyFailure {
    code: ErrorCode,
    error: String,
    checks: ReadyChecks,
}

/// Marks a start as in flight for `health()`, cleared on every exit path.
struct StartingGuard<'a>(&'a AtomicBool);

impl<'a> StartingGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    runtime: Arc<dyn ServerRuntime>,
    pid_file: PidFile,
    gate: RestartGate,
    handle: Mutex<ProcessHandle>,
    starting: AtomicBool,
    players: parking_lot::Mutex<Option<(Instant, PlayerCount)>>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("server_dir", &self.config.server_dir)
            .field("pid_file", &self.pid_file.path())
            .finish()
    }
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, runtime: Arc<dyn ServerRuntime>, gate: RestartGate) -> Self {
        let pid_file = PidFile::new(config.pid_file_path());
        Self {
            config,
            runtime,
            pid_file,
            gate,
            handle: Mutex::new(ProcessHandle::default()),
            starting: AtomicBool::new(false),
            players: parking_lot::Mutex::new(None),
        }
    }

    /// Supervisor over the real host.
    pub fn with_os_runtime(config: SupervisorConfig, gate: RestartGate) -> Self {
        let runtime = Arc::new(OsRuntime::new(config.clone()));
        Self::new(config, runtime, gate)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn gate(&self) -> &RestartGate {
        &self.gate
    }

    // ==========================================================================
    // Observation
    // ==========================================================================

    async fn snapshot(&self) -> ProcessSnapshot {
        let stale_pid = match self.pid_file.read().await {
            Ok(PidFileState::Present(pid)) if self.runtime.matches_server(pid) => {
                return ProcessSnapshot {
                    running: true,
                    pid: Some(pid),
                    stale_pid: false,
                };
            }
            Ok(PidFileState::Present(_)) | Ok(PidFileState::Corrupt) => true,
            Ok(PidFileState::Missing) => false,
            Err(e) => {
                warn!("Could not read PID file: {}", e);
                false
            }
        };

        match self.runtime.find_server_pid() {
            Some(pid) => {
                info!("Found running server by process scan (PID: {})", pid);
                self.record_pid(pid).await;
                ProcessSnapshot {
                    running: true,
                    pid: Some(pid),
                    stale_pid,
                }
            }
            None => ProcessSnapshot {
                running: false,
                pid: None,
                stale_pid,
            },
        }
    }

    async fn record_pid(&self, pid: u32) {
        if let Err(e) = self.pid_file.write(pid).await {
            error!("Failed to record PID {}: {}", pid, e);
        }
    }

    fn within_boot_grace(&self, pid: u32) -> bool {
        match self.runtime.process_started_at(pid) {
            Some(started_at) => {
                let age = (Utc::now() - started_at).to_std().unwrap_or(Duration::ZERO);
                age < self.config.timing.boot_grace
            }
            None => false,
        }
    }

    pub async fn health(&self) -> HealthSnapshot {
        let process = self.snapshot().await;
        let port_open = self.runtime.port_open().await;
        let booting = process.running
            && (self.starting.load(Ordering::SeqCst)
                || process.pid.map_or(false, |pid| self.within_boot_grace(pid)));

        HealthSnapshot::from_signals(HealthSignals {
            process_running: process.running,
            port_open,
            stale_pid: process.stale_pid,
            booting,
            pid: process.pid,
        })
    }

    pub async fn status(&self) -> ServerStatus {
        let health = self.health().await;
        let rcon_port_listening = self.runtime.rcon_port_open().await;

        let (started_at, memory_mb) = match health.pid.filter(|_| health.process_running) {
            Some(pid) => (
                self.runtime.process_started_at(pid),
                self.runtime.resident_memory(pid).map(|bytes| bytes / (1024 * 1024)),
            ),
            None => (None, None),
        };
        let uptime_seconds = started_at.map(|at| (Utc::now() - at).num_seconds().max(0) as u64);
        let players = if health.process_running {
            self.player_count().await
        } else {
            None
        };

        ServerStatus {
            game_port_listening: health.port_open,
            health,
            started_at,
            uptime_seconds,
            rcon_port_listening,
            players_online: players.map(|p| p.online),
            max_players: players.map(|p| p.max),
            memory_mb,
            restart_gate: self.gate.snapshot(),
        }
    }

    /// Player count, cached for `player_cache_ttl` to keep RCON traffic down.
    pub async fn player_count(&self) -> Option<PlayerCount> {
        if !self.snapshot().await.running {
            *self.players.lock() = None;
            return None;
        }

        if let Some((at, count)) = *self.players.lock() {
            if at.elapsed() < self.config.timing.player_cache_ttl {
                return Some(count);
            }
        }

        match self.runtime.rcon_command("list").await {
            Ok(response) => {
                let parsed = parse_player_list(&response);
                if let Some(count) = parsed {
                    *self.players.lock() = Some((Instant::now(), count));
                }
                parsed
            }
            Err(e) => {
                debug!("Player list refresh failed: {}", e);
                self.players.lock().map(|(_, count)| count)
            }
        }
    }

    // ==========================================================================
    // Commands
    // ==========================================================================

    pub async fn send_command(&self, command: &str) -> ActionOutcome {
        let command = command.trim();
        if command.is_empty() {
            return ActionOutcome::failed(ErrorCode::EmptyCommand, "Command is empty");
        }
        if !self.snapshot().await.running {
            return ActionOutcome::failed(ErrorCode::NotRunning, "Server is not running");
        }
        if !self.runtime.rcon_configured() {
            return ActionOutcome::failed(
                ErrorCode::RconNotConfigured,
                "RCON is not enabled. Enable it in server.properties and restart the server.",
            );
        }

        match self.runtime.rcon_command(command).await {
            Ok(response) => {
                debug!("RCON command '{}' answered {} bytes", command, response.len());
                ActionOutcome::ok("Command sent").with_response(strip_color_codes(&response))
            }
            Err(e @ (RconError::Connection { .. } | RconError::Auth { .. })) => {
                warn!("RCON unreachable for '{}': {}", command, e);
                ActionOutcome::failed(ErrorCode::RconConnectFailed, format!("RCON error: {}", e))
            }
            Err(e) => ActionOutcome::failed(ErrorCode::CommandFailed, format!("RCON error: {}", e)),
        }
    }

    pub async fn broadcast(&self, message: &str) -> ActionOutcome {
        self.send_command(&format!("say {}", message)).await
    }

    // ==========================================================================
    // Lifecycle
    // ==========================================================================

    pub async fn start(&self) -> ActionOutcome {
        let mut handle = self.handle.lock().await;
        let timeout = self.config.timing.ready_timeout;
        self.start_locked(&mut handle, timeout).await
    }

    pub async fn stop(&self, force: bool) -> ActionOutcome {
        let mut handle = self.handle.lock().await;
        self.stop_locked(&mut handle, force).await
    }

    pub async fn restart(&self, request: RestartRequest) -> ActionOutcome {
        let permit = match self.gate.try_acquire(&request.source) {
            Ok(permit) => permit,
            Err(rejection) => {
                info!(
                    "⛔ Restart from {} rejected: {} ({})",
                    request.source, rejection.code, rejection.message
                );
                return rejection.into_outcome();
            }
        };

        info!("Restarting server (source={})", request.source);
        let mut handle = self.handle.lock().await;
        let mut outcome = self.restart_locked(&mut handle, &request).await;
        outcome.last_restart_source = Some(request.source.clone());
        permit.complete(outcome.success);
        outcome
    }

    async fn restart_locked(&self, handle: &mut ProcessHandle, request: &RestartRequest) -> ActionOutcome {
        let stop = self.stop_locked(handle, false).await;
        if !stop.success && stop.error_code != Some(ErrorCode::NotRunning) {
            return ActionOutcome::failed(
                stop.error_code.unwrap_or(ErrorCode::StopFailed),
                format!("Failed to stop: {}", stop.error.unwrap_or_default()),
            );
        }

        self.cleanup_stale_pid().await;
        tokio::time::sleep(self.config.timing.restart_settle).await;

        let timing = &self.config.timing;
        let outcome = self
            .start_with_retries_locked(
                handle,
                request.ready_timeout.unwrap_or(timing.ready_timeout),
                request.start_retries.unwrap_or(timing.start_retries),
                request.retry_delay.unwrap_or(timing.retry_delay),
            )
            .await;

        if outcome.success {
            info!("✅ Server restarted (source={})", request.source);
        } else {
            error!(
                "Restart from {} failed: {}",
                request.source,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
        outcome
    }

    /// Incident recovery: force-stop, clean the PID file, start again,
    /// and record every step.
    pub async fn recover(&self) -> RecoveryTrace {
        let permit = match self.gate.try_acquire_exclusive("recover") {
            Ok(permit) => permit,
            Err(rejection) => {
                let health = self.health().await;
                warn!("Recovery rejected: {}", rejection.message);
                return RecoveryTrace {
                    success: false,
                    message: rejection.message.clone(),
                    error_code: Some(rejection.code),
                    steps: vec![
                        RecoveryStep::new(RecoveryStepKind::Precheck, StepStatus::Done)
                            .with_health(health.clone()),
                        RecoveryStep::skipped(RecoveryStepKind::ForceStop, rejection.code.as_str()),
                        RecoveryStep::skipped(RecoveryStepKind::PidCleanup, rejection.code.as_str()),
                        RecoveryStep::skipped(RecoveryStepKind::Start, rejection.code.as_str()),
                        RecoveryStep::skipped(RecoveryStepKind::Postcheck, rejection.code.as_str()),
                    ],
                    server: health,
                };
            }
        };

        let mut handle = self.handle.lock().await;
        let mut steps = Vec::with_capacity(5);

        // 1. precheck
        let before = self.health().await;
        info!("Recovery precheck: {}", before.state_reason);
        steps.push(RecoveryStep::new(RecoveryStepKind::Precheck, StepStatus::Done).with_health(before.clone()));

        if before.healthy {
            for kind in [
                RecoveryStepKind::ForceStop,
                RecoveryStepKind::PidCleanup,
                RecoveryStepKind::Start,
            ] {
                steps.push(RecoveryStep::skipped(kind, "already_healthy"));
            }
            steps.push(
                RecoveryStep::new(RecoveryStepKind::Postcheck, StepStatus::Done).with_health(before.clone()),
            );
            permit.release();
            return RecoveryTrace {
                success: true,
                message: "Server already healthy".to_string(),
                error_code: None,
                steps,
                server: before,
            };
        }

        // 2. force_stop
        let mut aborted: Option<ErrorCode> = None;
        if before.process_running {
            let stop = self.stop_locked(&mut handle, true).await;
            let mut step = if stop.success {
                RecoveryStep::new(RecoveryStepKind::ForceStop, StepStatus::Done).acted()
            } else if stop.error_code == Some(ErrorCode::NotRunning) {
                RecoveryStep::new(RecoveryStepKind::ForceStop, StepStatus::Done).with_detail("not_running")
            } else {
                aborted = Some(stop.error_code.unwrap_or(ErrorCode::StopFailed));
                RecoveryStep::new(RecoveryStepKind::ForceStop, StepStatus::Failed)
            };
            step.method = stop.method;
            step.error_code = stop.error_code.filter(|_| !stop.success);
            if let Some(error) = stop.error.clone() {
                step.detail.get_or_insert(error);
            }
            steps.push(step);
            tokio::time::sleep(self.config.timing.recover_settle).await;
        } else {
            steps.push(RecoveryStep::skipped(RecoveryStepKind::ForceStop, "no_process"));
        }

        if let Some(code) = aborted {
            steps.push(RecoveryStep::skipped(RecoveryStepKind::PidCleanup, "force_stop_failed"));
            steps.push(RecoveryStep::skipped(RecoveryStepKind::Start, "force_stop_failed"));
            let after = self.health().await;
            steps.push(RecoveryStep::new(RecoveryStepKind::Postcheck, StepStatus::Done).with_health(after.clone()));
            permit.complete(false);
            error!("Recovery could not stop the existing process");
            return RecoveryTrace {
                success: false,
                message: "Recovery failed to stop existing process".to_string(),
                error_code: Some(code),
                steps,
                server: after,
            };
        }

        // 3. pid_cleanup
        let removed = self.cleanup_stale_pid().await;
        let mut step = RecoveryStep::new(RecoveryStepKind::PidCleanup, StepStatus::Done);
        step.stale_pid_removed = Some(removed);
        if removed {
            step = step.acted();
        }
        steps.push(step);

        // 4. start
        let timing = &self.config.timing;
        let start = self
            .start_with_retries_locked(&mut handle, timing.ready_timeout, timing.start_retries, timing.retry_delay)
            .await;
        let status = if start.success { StepStatus::Done } else { StepStatus::Failed };
        let mut step = RecoveryStep::new(RecoveryStepKind::Start, status).acted();
        step.error_code = start.error_code;
        step.detail = Some(format!(
            "attempt {}: {}",
            start.restart_start_attempt.unwrap_or(1),
            start.error.as_deref().or(start.message.as_deref()).unwrap_or("")
        ));
        steps.push(step);

        // 5. postcheck
        let after = self.health().await;
        steps.push(RecoveryStep::new(RecoveryStepKind::Postcheck, StepStatus::Done).with_health(after.clone()));

        let success = after.is_ok();
        permit.complete(success);

        let (message, error_code) = if success {
            info!("✅ Server recovered");
            ("Server recovered successfully".to_string(), None)
        } else if !start.success {
            (
                start.error.unwrap_or_else(|| "Recovery failed to start server".to_string()),
                start.error_code,
            )
        } else {
            (
                format!(
                    "Recovery start returned success, but server is not healthy ({})",
                    after.state_reason
                ),
                None,
            )
        };
        if !success {
            error!("Recovery failed: {}", message);
        }

        RecoveryTrace {
            success,
            message,
            error_code,
            steps,
            server: after,
        }
    }

    // ==========================================================================
    // Internals (mutation lock held)
    // ==========================================================================

    async fn start_locked(&self, handle: &mut ProcessHandle, ready_timeout: Duration) -> ActionOutcome {
        let process = self.snapshot().await;
        if process.running {
            let mut outcome = ActionOutcome::failed(ErrorCode::AlreadyRunning, "Server is already running");
            outcome.pid = process.pid;
            return outcome;
        }

        if !self.runtime.start_script_present() {
            return ActionOutcome::failed(
                ErrorCode::StartScriptMissing,
                format!("{} not found", self.config.start_script_path().display()),
            );
        }

        let _starting = StartingGuard::new(&self.starting);
        let mut pid = match self.runtime.launch().await {
            Ok(pid) => pid,
            Err(e) => {
                error!("Failed to launch server: {}", e);
                return ActionOutcome::failed(ErrorCode::LaunchFailed, e.to_string());
            }
        };
        info!("Server process launched (PID: {})", pid);

        self.record_pid(pid).await;
        handle.pid = Some(pid);
        *self.players.lock() = None;

        let ready = self.wait_until_ready(&mut pid, ready_timeout).await;
        handle.pid = Some(pid);
        match ready {
            Ok(checks) => ActionOutcome::ok("Server started and passed readiness checks")
                .with_pid(pid)
                .with_ready_checks(checks),
            Err(failure) => {
                warn!("Server PID {} failed readiness: {}", pid, failure.error);
                if failure.code == ErrorCode::ProcessExitedEarly {
                    handle.pid = None;
                }
                ActionOutcome::failed(failure.code, failure.error)
                    .with_pid(pid)
                    .with_ready_checks(failure.checks)
            }
        }
    }

    /// Poll until the server answers. `pid` starts as the launched PID and
    /// is replaced when the real server turns out to be a child of it.
    async fn wait_until_ready(&self, pid: &mut u32, timeout: Duration) -> Result<ReadyChecks, ReadyFailure> {
        let timing = &self.config.timing;
        let started = Instant::now();
        let probe_rcon = self.config.require_rcon_ready && self.runtime.rcon_configured();
        let mut checks = ReadyChecks {
            timeout_seconds: timeout.as_secs().max(1),
            ..Default::default()
        };
        if self.config.require_rcon_ready && !probe_rcon {
            checks.last_rcon_error = Some(ErrorCode::RconNotConfigured.to_string());
        }

        loop {
            let elapsed = started.elapsed();
            checks.elapsed_seconds = elapsed.as_secs();

            let mut alive = self.runtime.matches_server(*pid);
            if !alive {
                if let Some(found) = self.runtime.find_server_pid() {
                    info!("Launched PID {} is a wrapper; server runs as PID {}", *pid, found);
                    self.record_pid(found).await;
                    *pid = found;
                    alive = true;
                }
            }

            if !alive {
                checks.process_alive = false;
                if elapsed >= timing.boot_grace {
                    if let Err(e) = self.pid_file.remove().await {
                        warn!("Could not remove PID file: {}", e);
                    }
                    return Err(ReadyFailure {
                        code: ErrorCode::ProcessExitedEarly,
                        error: "Server process exited before readiness checks completed".to_string(),
                        checks,
                    });
                }
            } else {
                checks.process_alive = true;
                checks.port_open = self.runtime.port_open().await;

                if checks.port_open {
                    if !probe_rcon {
                        return Ok(checks);
                    }
                    match self.runtime.probe_rcon().await {
                        Ok(()) => {
                            checks.rcon_ready = true;
                            checks.last_rcon_error = None;
                            checks.elapsed_seconds = started.elapsed().as_secs();
                            return Ok(checks);
                        }
                        Err(e) => checks.last_rcon_error = Some(e.to_string()),
                    }
                }
            }

            if started.elapsed() >= timeout {
                break;
            }
            tokio::time::sleep(timing.ready_poll).await;
        }

        checks.elapsed_seconds = started.elapsed().as_secs();
        Err(ReadyFailure {
            code: ErrorCode::RconNotReadyTimeout,
            error: format!(
                "Server started but did not become ready within {}s (last_rcon_error={})",
                checks.timeout_seconds,
                checks.last_rcon_error.as_deref().unwrap_or("none")
            ),
            checks,
        })
    }

    async fn start_with_retries_locked(
        &self,
        handle: &mut ProcessHandle,
        ready_timeout: Duration,
        start_retries: u32,
        retry_delay: Duration,
    ) -> ActionOutcome {
        let max_attempts = start_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            let mut outcome = self.start_locked(handle, ready_timeout).await;
            outcome.restart_start_attempt = Some(attempt);

            if outcome.success {
                if attempt > 1 {
                    outcome.message = Some(format!(
                        "{} (start retry {})",
                        outcome.message.as_deref().unwrap_or("Server restart completed"),
                        attempt - 1
                    ));
                }
                return outcome;
            }

            // Only a crash during boot is worth another try; a hung port or
            // a missing script will not fix itself.
            let retryable = outcome.error_code == Some(ErrorCode::ProcessExitedEarly);
            if retryable && attempt < max_attempts {
                warn!(
                    "Start attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    max_attempts,
                    outcome.error.as_deref().unwrap_or("unknown"),
                    retry_delay
                );
                tokio::time::sleep(retry_delay).await;
                attempt += 1;
                continue;
            }

            outcome.error = Some(format!(
                "Failed to start after {} attempt(s): {}",
                attempt,
                outcome.error.as_deref().unwrap_or("Unknown error")
            ));
            return outcome;
        }
    }

    async fn stop_locked(&self, handle: &mut ProcessHandle, force: bool) -> ActionOutcome {
        let process = self.snapshot().await;
        let pid = match process.pid {
            Some(pid) if process.running => pid,
            // PID file lost, but the child we launched is still up.
            _ => match handle.pid.filter(|pid| self.runtime.matches_server(*pid)) {
                Some(pid) => pid,
                None => return ActionOutcome::failed(ErrorCode::NotRunning, "Server is not running"),
            },
        };
        let timing = &self.config.timing;
        info!("Stopping server (PID: {}, force={})", pid, force);

        if self.runtime.rcon_configured() {
            match self.runtime.rcon_command("stop").await {
                Ok(_) => {
                    if self.wait_for_exit(pid, timing.rcon_stop_wait).await {
                        return self.mark_stopped(handle, pid, StopMethod::Rcon, "Server stopped via RCON").await;
                    }
                    warn!("Server still alive {:?} after RCON stop", timing.rcon_stop_wait);
                }
                Err(e) => warn!("RCON stop failed: {}", e),
            }
        }

        info!("Sending SIGTERM to PID {}", pid);
        match self.runtime.signal(pid, StopSignal::Terminate) {
            Ok(()) | Err(ProcessError::NotFound { .. }) => {}
            Err(e) => warn!("Failed to send SIGTERM to PID {}: {}", pid, e),
        }
        if self.wait_for_exit(pid, timing.sigterm_wait).await {
            return self.mark_stopped(handle, pid, StopMethod::Sigterm, "Server stopped via SIGTERM").await;
        }

        if force {
            warn!("Force killing PID {}", pid);
            match self.runtime.signal(pid, StopSignal::Kill) {
                Ok(()) | Err(ProcessError::NotFound { .. }) => {}
                Err(e) => {
                    error!("Force kill failed for PID {}: {}", pid, e);
                    return ActionOutcome::failed(ErrorCode::StopFailed, e.to_string()).with_pid(pid);
                }
            }
            tokio::time::sleep(timing.kill_wait).await;
            return self.mark_stopped(handle, pid, StopMethod::Sigkill, "Server force-killed").await;
        }

        ActionOutcome::failed(
            ErrorCode::StopFailed,
            "Could not stop server gracefully. Try force=true.",
        )
        .with_pid(pid)
    }

    async fn wait_for_exit(&self, pid: u32, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return !self.runtime.matches_server(pid);
            }
            tokio::time::sleep(self.config.timing.exit_poll.min(deadline - now)).await;
            if !self.runtime.matches_server(pid) {
                return true;
            }
        }
    }

    async fn mark_stopped(
        &self,
        handle: &mut ProcessHandle,
        pid: u32,
        method: StopMethod,
        message: &str,
    ) -> ActionOutcome {
        if let Err(e) = self.pid_file.remove().await {
            warn!("Could not remove PID file: {}", e);
        }
        handle.pid = None;
        *self.players.lock() = None;
        info!("{} (PID: {})", message, pid);
        ActionOutcome::ok(message).with_method(method).with_pid(pid)
    }

    /// Remove a PID file that does not point at a live server.
    async fn cleanup_stale_pid(&self) -> bool {
        let stale = match self.pid_file.read().await {
            Ok(PidFileState::Present(pid)) => !self.runtime.matches_server(pid),
            Ok(PidFileState::Corrupt) => true,
            Ok(PidFileState::Missing) => false,
            Err(e) => {
                warn!("Could not read PID file: {}", e);
                false
            }
        };
        if !stale {
            return false;
        }
        match self.pid_file.remove().await {
            Ok(removed) => {
                if removed {
                    info!("Removed stale PID file {}", self.pid_file.path().display());
                }
                removed
            }
            Err(e) => {
                warn!("Could not remove stale PID file: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ServerOps for Supervisor {
    async fn health(&self) -> HealthSnapshot {
        Supervisor::health(self).await
    }

    async fn status(&self) -> ServerStatus {
        Supervisor::status(self).await
    }

    async fn start(&self) -> ActionOutcome {
        Supervisor::start(self).await
    }

    async fn stop(&self, force: bool) -> ActionOutcome {
        Supervisor::stop(self, force).await
    }

    async fn restart(&self, request: RestartRequest) -> ActionOutcome {
        Supervisor::restart(self, request).await
    }

    async fn recover(&self) -> RecoveryTrace {
        Supervisor::recover(self).await
    }

    async fn send_command(&self, command: &str) -> ActionOutcome {
        Supervisor::send_command(self, command).await
    }

    async fn broadcast(&self, message: &str) -> ActionOutcome {
        Supervisor::broadcast(self, message).await
    }

    async fn player_count(&self) -> Option<PlayerCount> {
        Supervisor::player_count(self).await
    }
}
