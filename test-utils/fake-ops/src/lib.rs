//! Scripted [`ServerOps`] for tests.
//!
//! Models a server that is either up (process and port) or down, with a
//! settable player count. Restarts go through a real [`RestartGate`] so
//! cooldown and in-progress rejections behave like production. Outcomes of
//! `start`, `stop` and `restart` can be queued to script failures, and every
//! call is counted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mcops_common::{
    ActionOutcome, ErrorCode, HealthSignals, HealthSnapshot, RecoveryStep, RecoveryStepKind,
    RecoveryTrace, StepStatus, StopMethod,
};
use mcops_rcon::PlayerCount;
use mcops_supervisor::{GateConfig, RestartGate, RestartRequest, ServerOps, ServerStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

const FAKE_PID: u32 = 4242;

#[derive(Debug, Default)]
struct State {
    running: bool,
    port_open: bool,
    started_at: Option<DateTime<Utc>>,
    players_online: u32,
    max_players: u32,
    start_script: VecDeque<ActionOutcome>,
    stop_script: VecDeque<ActionOutcome>,
    restart_script: VecDeque<ActionOutcome>,
    calls: HashMap<&'static str, usize>,
    commands: Vec<String>,
    restart_sources: Vec<String>,
}

pub struct FakeServerOps {
    state: Mutex<State>,
    gate: RestartGate,
    delay: Mutex<Duration>,
    command_delay: Mutex<Duration>,
}

impl Default for FakeServerOps {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServerOps {
    /// A healthy running server with nobody online, and a gate without cooldown.
    pub fn new() -> Self {
        Self::with_gate(GateConfig {
            cooldown: Duration::ZERO,
            ..GateConfig::default()
        })
    }

    pub fn with_gate(config: GateConfig) -> Self {
        Self {
            state: Mutex::new(State {
                running: true,
                port_open: true,
                started_at: Some(Utc::now()),
                max_players: 20,
                ..State::default()
            }),
            gate: RestartGate::new(config),
            delay: Mutex::new(Duration::ZERO),
            command_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn gate(&self) -> &RestartGate {
        &self.gate
    }

    /// Time every lifecycle call spends "working".
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Time each console command spends in flight before it is recorded.
    pub fn set_command_delay(&self, delay: Duration) {
        *self.command_delay.lock() = delay;
    }

    pub fn set_running(&self, running: bool) {
        let mut state = self.state.lock();
        state.running = running;
        state.port_open = running;
        state.started_at = running.then(Utc::now);
    }

    /// Process alive but the game port closed.
    pub fn set_degraded(&self) {
        let mut state = self.state.lock();
        state.running = true;
        state.port_open = false;
    }

    pub fn set_started_at(&self, started_at: DateTime<Utc>) {
        self.state.lock().started_at = Some(started_at);
    }

    pub fn set_players(&self, online: u32) {
        self.state.lock().players_online = online;
    }

    pub fn queue_start(&self, outcome: ActionOutcome) {
        self.state.lock().start_script.push_back(outcome);
    }

    pub fn queue_stop(&self, outcome: ActionOutcome) {
        self.state.lock().stop_script.push_back(outcome);
    }

    pub fn queue_restart(&self, outcome: ActionOutcome) {
        self.state.lock().restart_script.push_back(outcome);
    }

    pub fn calls(&self, name: &str) -> usize {
        self.state.lock().calls.get(name).copied().unwrap_or(0)
    }

    /// Commands received by `send_command` (broadcasts included).
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn restart_sources(&self) -> Vec<String> {
        self.state.lock().restart_sources.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn count(&self, name: &'static str) {
        *self.state.lock().calls.entry(name).or_default() += 1;
    }

    async fn work(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn snapshot(&self) -> HealthSnapshot {
        let state = self.state.lock();
        HealthSnapshot::from_signals(HealthSignals {
            process_running: state.running,
            port_open: state.port_open,
            stale_pid: false,
            booting: false,
            pid: state.running.then_some(FAKE_PID),
        })
    }

    fn bring_up(&self) {
        let mut state = self.state.lock();
        state.running = true;
        state.port_open = true;
        state.started_at = Some(Utc::now());
    }

    fn take_down(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.port_open = false;
        state.started_at = None;
    }
}

#[async_trait]
impl ServerOps for FakeServerOps {
    async fn health(&self) -> HealthSnapshot {
        self.snapshot()
    }

    async fn status(&self) -> ServerStatus {
        let health = self.snapshot();
        let state = self.state.lock();
        let uptime_seconds = state
            .started_at
            .filter(|_| state.running)
            .map(|at| (Utc::now() - at).num_seconds().max(0) as u64);
        ServerStatus {
            health,
            started_at: state.started_at,
            uptime_seconds,
            game_port_listening: state.port_open,
            rcon_port_listening: state.port_open,
            players_online: state.running.then_some(state.players_online),
            max_players: state.running.then_some(state.max_players),
            memory_mb: None,
            restart_gate: self.gate.snapshot(),
        }
    }

    async fn start(&self) -> ActionOutcome {
        self.count("start");
        self.work().await;
        let scripted = self.state.lock().start_script.pop_front();
        if let Some(outcome) = scripted {
            if outcome.success {
                self.bring_up();
            }
            return outcome;
        }
        if self.is_running() {
            return ActionOutcome::failed(ErrorCode::AlreadyRunning, "Server is already running");
        }
        self.bring_up();
        ActionOutcome::ok("Server started").with_pid(FAKE_PID)
    }

    async fn stop(&self, force: bool) -> ActionOutcome {
        self.count("stop");
        self.work().await;
        let scripted = self.state.lock().stop_script.pop_front();
        if let Some(outcome) = scripted {
            if outcome.success {
                self.take_down();
            }
            return outcome;
        }
        if !self.is_running() {
            return ActionOutcome::failed(ErrorCode::NotRunning, "Server is not running");
        }
        self.take_down();
        let method = if force { StopMethod::Sigkill } else { StopMethod::Rcon };
        ActionOutcome::ok("Server stopped").with_method(method)
    }

    async fn restart(&self, request: RestartRequest) -> ActionOutcome {
        self.count("restart");
        let permit = match self.gate.try_acquire(&request.source) {
            Ok(permit) => permit,
            Err(rejection) => return rejection.into_outcome(),
        };
        self.state.lock().restart_sources.push(request.source.clone());
        self.work().await;

        let scripted = self.state.lock().restart_script.pop_front();
        let outcome = scripted.unwrap_or_else(|| ActionOutcome::ok("Server restarted").with_pid(FAKE_PID));
        if outcome.success {
            self.bring_up();
        } else {
            self.take_down();
        }
        debug!("fake restart from {} -> {}", request.source, outcome.success);
        permit.complete(outcome.success);
        outcome
    }

    async fn recover(&self) -> RecoveryTrace {
        self.count("recover");
        self.work().await;
        let before = self.snapshot();
        self.bring_up();
        let after = self.snapshot();
        let steps = vec![
            RecoveryStep::new(RecoveryStepKind::Precheck, StepStatus::Done).with_health(before),
            RecoveryStep::new(RecoveryStepKind::ForceStop, StepStatus::Done).acted(),
            RecoveryStep::skipped(RecoveryStepKind::PidCleanup, "no stale pid file"),
            RecoveryStep::new(RecoveryStepKind::Start, StepStatus::Done).acted(),
            RecoveryStep::new(RecoveryStepKind::Postcheck, StepStatus::Done).with_health(after.clone()),
        ];
        RecoveryTrace {
            success: true,
            message: "Server recovered".to_string(),
            error_code: None,
            steps,
            server: after,
        }
    }

    async fn send_command(&self, command: &str) -> ActionOutcome {
        self.count("send_command");
        let delay = *self.command_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.is_running() {
            return ActionOutcome::failed(ErrorCode::NotRunning, "Server is not running");
        }
        self.state.lock().commands.push(command.to_string());
        ActionOutcome::ok("Command sent").with_response("")
    }

    async fn player_count(&self) -> Option<PlayerCount> {
        let state = self.state.lock();
        state.running.then_some(PlayerCount {
            online: state.players_online,
            max: state.max_players,
        })
    }
}
