//! The static operation table.
//!
//! Every server operation an operator or scheduler may run is listed here,
//! with the permission it needs, its risk class, an optional preflight and
//! its executor. The table is built at compile time; there is no runtime
//! registration.

use crate::command_policy;
use crate::outcome::ExecutionOutcome;
use crate::params::{OperationParams, ParamKind, ParamSpec};
use futures::future::BoxFuture;
use mcops_common::ErrorCode;
use mcops_supervisor::{RestartRequest, ServerOps};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Rejection raised before the executor runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightFailure {
    pub code: ErrorCode,
    pub message: String,
}

pub type Preflight = fn(&OperationParams) -> Result<(), PreflightFailure>;

pub type Executor = for<'a> fn(&'a dyn ServerOps, &'a OperationParams) -> BoxFuture<'a, ExecutionOutcome>;

pub struct OperationSpec {
    pub key: &'static str,
    pub permission: &'static str,
    pub admin_only: bool,
    pub risk: RiskLevel,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub preflight: Option<Preflight>,
    pub executor: Executor,
}

impl std::fmt::Debug for OperationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationSpec")
            .field("key", &self.key)
            .field("permission", &self.permission)
            .field("admin_only", &self.admin_only)
            .field("risk", &self.risk)
            .finish()
    }
}

pub const SERVER_START: &str = "server:start";
pub const SERVER_STOP: &str = "server:stop";
pub const SERVER_RESTART: &str = "server:restart";
pub const SERVER_RECOVER: &str = "server:recover";
pub const SERVER_COMMAND: &str = "server:command";

/// Restart source when the caller does not name one.
pub const DEFAULT_RESTART_SOURCE: &str = "operations";

pub static OPERATIONS: &[OperationSpec] = &[
    OperationSpec {
        key: SERVER_START,
        permission: SERVER_START,
        admin_only: false,
        risk: RiskLevel::Medium,
        description: "Start the server and wait until it is ready",
        params: &[],
        preflight: None,
        executor: exec_start,
    },
    OperationSpec {
        key: SERVER_STOP,
        permission: SERVER_STOP,
        admin_only: true,
        risk: RiskLevel::High,
        description: "Stop the server (RCON, then SIGTERM, then SIGKILL when forced)",
        params: &[ParamSpec {
            name: "force",
            kind: ParamKind::Bool,
            required: false,
        }],
        preflight: None,
        executor: exec_stop,
    },
    OperationSpec {
        key: SERVER_RESTART,
        permission: SERVER_RESTART,
        admin_only: false,
        risk: RiskLevel::Medium,
        description: "Gated restart with start retries",
        params: &[ParamSpec {
            name: "source",
            kind: ParamKind::String,
            required: false,
        }],
        preflight: None,
        executor: exec_restart,
    },
    OperationSpec {
        key: SERVER_RECOVER,
        permission: SERVER_RECOVER,
        admin_only: true,
        risk: RiskLevel::High,
        description: "Force-stop, clean a stale PID file and start again",
        params: &[],
        preflight: None,
        executor: exec_recover,
    },
    OperationSpec {
        key: SERVER_COMMAND,
        permission: SERVER_COMMAND,
        admin_only: true,
        risk: RiskLevel::High,
        description: "Send one console command over RCON",
        params: &[ParamSpec {
            name: "command",
            kind: ParamKind::String,
            required: true,
        }],
        preflight: Some(preflight_command),
        executor: exec_command,
    },
];

pub fn find_operation(key: &str) -> Option<&'static OperationSpec> {
    OPERATIONS.iter().find(|spec| spec.key == key)
}

fn exec_start<'a>(ops: &'a dyn ServerOps, _params: &'a OperationParams) -> BoxFuture<'a, ExecutionOutcome> {
    Box::pin(async move { ExecutionOutcome::from(ops.start().await) })
}

fn exec_stop<'a>(ops: &'a dyn ServerOps, params: &'a OperationParams) -> BoxFuture<'a, ExecutionOutcome> {
    Box::pin(async move {
        let force = params.bool("force").unwrap_or(false);
        ExecutionOutcome::from(ops.stop(force).await)
    })
}

fn exec_restart<'a>(ops: &'a dyn ServerOps, params: &'a OperationParams) -> BoxFuture<'a, ExecutionOutcome> {
    Box::pin(async move {
        let source = params.str("source").unwrap_or(DEFAULT_RESTART_SOURCE);
        ExecutionOutcome::from(ops.restart(RestartRequest::new(source)).await)
    })
}

fn exec_recover<'a>(ops: &'a dyn ServerOps, _params: &'a OperationParams) -> BoxFuture<'a, ExecutionOutcome> {
    Box::pin(async move { ExecutionOutcome::from(ops.recover().await) })
}

fn exec_command<'a>(ops: &'a dyn ServerOps, params: &'a OperationParams) -> BoxFuture<'a, ExecutionOutcome> {
    Box::pin(async move {
        let command = params.str("command").unwrap_or_default();
        ExecutionOutcome::from(ops.send_command(command).await)
    })
}

fn preflight_command(params: &OperationParams) -> Result<(), PreflightFailure> {
    let command = params.str("command").unwrap_or_default();
    let decision = command_policy::decide(command);
    match decision.reason {
        None => Ok(()),
        Some(ErrorCode::EmptyCommand) => Err(PreflightFailure {
            code: ErrorCode::EmptyCommand,
            message: "Command is empty".to_string(),
        }),
        Some(code) => Err(PreflightFailure {
            code,
            message: format!(
                "'{}' is blocked; use the dedicated operation instead",
                decision.base_command
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_keys_unique_and_permissions() {
        let mut keys: Vec<_> = OPERATIONS.iter().map(|s| s.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), OPERATIONS.len());

        let stop = find_operation(SERVER_STOP).unwrap();
        assert!(stop.admin_only);
        assert_eq!(stop.risk, RiskLevel::High);
        assert!(!find_operation(SERVER_RESTART).unwrap().admin_only);
        assert!(find_operation("server:nuke").is_none());
    }

    #[test]
    fn test_command_preflight() {
        let preflight = find_operation(SERVER_COMMAND).unwrap().preflight.unwrap();

        assert!(preflight(&OperationParams::new().with("command", "list")).is_ok());
        let failure = preflight(&OperationParams::new().with("command", "/op Steve")).unwrap_err();
        assert_eq!(failure.code, ErrorCode::DangerousCommand);
        let failure = preflight(&OperationParams::new().with("command", "")).unwrap_err();
        assert_eq!(failure.code, ErrorCode::EmptyCommand);
    }
}
