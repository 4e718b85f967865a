//! Value objects returned across layer boundaries.
//!
//! Everything here is plain data: cheap to clone, serializable for the
//! web layer and the trace, and recomputed rather than cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==============================================================================
// Health
// ==============================================================================

/// Why the server is (or is not) healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateReason {
    /// Process alive and the health port accepts connections.
    Ok,
    /// PID file exists but no matching live process.
    StalePid,
    /// Process alive but the port stays closed past the boot grace.
    ProcessNoPort,
    /// Something answers on the port but it is not our process.
    PortBusyNoProcess,
    /// Process alive, port not open yet, still inside the boot window.
    Starting,
    /// Nothing running.
    Stopped,
}

impl StateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::StalePid => "stale_pid",
            Self::ProcessNoPort => "process_no_port",
            Self::PortBusyNoProcess => "port_busy_no_process",
            Self::Starting => "starting",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for StateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw signals the supervisor gathers before classifying health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSignals {
    pub process_running: bool,
    pub port_open: bool,
    pub stale_pid: bool,
    /// A start is in flight or the process is younger than the boot grace.
    pub booting: bool,
    pub pid: Option<u32>,
}

/// Snapshot returned by every supervisor health query.
///
/// `healthy == true` always implies `state_reason == StateReason::Ok`;
/// [`HealthSnapshot::from_signals`] is the only constructor that decides
/// the reason, so the two cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Alias of `process_running`, kept for older callers.
    pub running: bool,
    pub process_running: bool,
    pub healthy: bool,
    pub state_reason: StateReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub port_open: bool,
    pub checked_at: DateTime<Utc>,
}

impl HealthSnapshot {
    /// Classify raw signals. Order matters: a healthy process wins over a
    /// leftover PID file, and a stale PID file wins over everything else.
    pub fn from_signals(signals: HealthSignals) -> Self {
        let healthy = signals.process_running && signals.port_open;

        let state_reason = if healthy {
            StateReason::Ok
        } else if signals.stale_pid {
            StateReason::StalePid
        } else if signals.process_running && signals.booting {
            StateReason::Starting
        } else if signals.process_running {
            StateReason::ProcessNoPort
        } else if signals.port_open {
            StateReason::PortBusyNoProcess
        } else {
            StateReason::Stopped
        };

        Self {
            running: signals.process_running,
            process_running: signals.process_running,
            healthy,
            state_reason,
            pid: signals.pid,
            port_open: signals.port_open,
            checked_at: Utc::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.state_reason == StateReason::Ok
    }
}

// ==============================================================================
// Outcomes
// ==============================================================================

/// Stable machine-readable codes attached to soft failures and rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RestartInProgress,
    RestartCooldown,
    RestartCircuitOpen,
    AlreadyRunning,
    NotRunning,
    StartScriptMissing,
    LaunchFailed,
    RconNotConfigured,
    RconConnectFailed,
    ProcessExitedEarly,
    RconNotReadyTimeout,
    StopFailed,
    CommandFailed,
    EmptyCommand,
    DangerousCommand,
    PreflightFailed,
    ExecutionFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RestartInProgress => "restart_in_progress",
            Self::RestartCooldown => "restart_cooldown",
            Self::RestartCircuitOpen => "restart_circuit_open",
            Self::AlreadyRunning => "already_running",
            Self::NotRunning => "not_running",
            Self::StartScriptMissing => "start_script_missing",
            Self::LaunchFailed => "launch_failed",
            Self::RconNotConfigured => "rcon_not_configured",
            Self::RconConnectFailed => "rcon_connect_failed",
            Self::ProcessExitedEarly => "process_exited_early",
            Self::RconNotReadyTimeout => "rcon_not_ready_timeout",
            Self::StopFailed => "stop_failed",
            Self::CommandFailed => "command_failed",
            Self::EmptyCommand => "empty_command",
            Self::DangerousCommand => "dangerous_command",
            Self::PreflightFailed => "preflight_failed",
            Self::ExecutionFailed => "execution_failed",
        }
    }

    /// Gate rejections are "try later", not failures.
    pub fn is_gate_rejection(&self) -> bool {
        matches!(
            self,
            Self::RestartInProgress | Self::RestartCooldown | Self::RestartCircuitOpen
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stop request ended up terminating the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    Rcon,
    Sigterm,
    Sigkill,
}

/// Diagnostics collected while waiting for a freshly launched server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyChecks {
    pub process_alive: bool,
    pub port_open: bool,
    pub rcon_ready: bool,
    pub last_rcon_error: Option<String>,
    pub elapsed_seconds: u64,
    pub timeout_seconds: u64,
}

/// Structured result of a supervisor lifecycle action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_restart_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<StopMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_checks: Option<ReadyChecks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_start_attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failed(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            error_code: Some(code),
            ..Default::default()
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_method(mut self, method: StopMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_ready_checks(mut self, checks: ReadyChecks) -> Self {
        self.ready_checks = Some(checks);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn is_gate_rejection(&self) -> bool {
        self.error_code.map_or(false, |c| c.is_gate_rejection())
    }
}

// ==============================================================================
// Recovery
// ==============================================================================

/// The five recovery steps, always reported in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStepKind {
    Precheck,
    ForceStop,
    PidCleanup,
    Start,
    Postcheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Done,
    Failed,
    Skipped,
}

/// One entry of a [`RecoveryTrace`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStep {
    pub step: RecoveryStepKind,
    pub status: StepStatus,
    /// True when the step changed something on the host.
    pub acted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<StopMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_pid_removed: Option<bool>,
}

impl RecoveryStep {
    pub fn new(step: RecoveryStepKind, status: StepStatus) -> Self {
        Self {
            step,
            status,
            acted: false,
            detail: None,
            error_code: None,
            health: None,
            method: None,
            stale_pid_removed: None,
        }
    }

    pub fn skipped(step: RecoveryStepKind, detail: impl Into<String>) -> Self {
        Self::new(step, StepStatus::Skipped).with_detail(detail)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_health(mut self, health: HealthSnapshot) -> Self {
        self.health = Some(health);
        self
    }

    pub fn acted(mut self) -> Self {
        self.acted = true;
        self
    }
}

/// Full record of a `recover()` run, kept for incident review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryTrace {
    pub success: bool,
    pub message: String,
    /// Set when recovery was refused or a step failed with a known code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub steps: Vec<RecoveryStep>,
    pub server: HealthSnapshot,
}

impl RecoveryTrace {
    pub fn step(&self, kind: RecoveryStepKind) -> Option<&RecoveryStep> {
        self.steps.iter().find(|s| s.step == kind)
    }
}
