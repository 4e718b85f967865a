//! Result shapes of the registry.

use mcops_common::{ActionOutcome, ErrorCode, RecoveryTrace};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Terminal (or replayed) status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Succeeded,
    Failed,
    /// The restart gate said "not now". Carries `retry_after_seconds`.
    Rejected,
    /// Same idempotency key still running.
    InProgress,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::InProgress => "in_progress",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an executor (or preflight) produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub retry_after_seconds: Option<u64>,
    /// Executor-specific extras (method, pid, ready checks, recovery steps).
    pub data: Value,
}

impl ExecutionOutcome {
    pub fn failed(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            error_code: Some(code),
            data: Value::Null,
            ..Default::default()
        }
    }
}

impl From<ActionOutcome> for ExecutionOutcome {
    fn from(outcome: ActionOutcome) -> Self {
        let data = serde_json::to_value(&outcome).unwrap_or(Value::Null);
        Self {
            success: outcome.success,
            message: outcome.message,
            error: outcome.error,
            error_code: outcome.error_code,
            retry_after_seconds: outcome.retry_after_seconds,
            data,
        }
    }
}

impl From<RecoveryTrace> for ExecutionOutcome {
    fn from(trace: RecoveryTrace) -> Self {
        let data = serde_json::json!({
            "steps": trace.steps,
            "server": trace.server,
        });
        let (message, error) = if trace.success {
            (Some(trace.message), None)
        } else {
            (None, Some(trace.message))
        };
        Self {
            success: trace.success,
            message,
            error,
            error_code: trace.error_code,
            retry_after_seconds: None,
            data,
        }
    }
}

/// Response of `OperationRegistry::execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub op_id: String,
    pub op_key: String,
    pub success: bool,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(default)]
    pub idempotent_replay: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub data: Value,
}

impl OperationOutcome {
    pub fn from_execution(op_id: String, op_key: &str, execution: ExecutionOutcome, duration_ms: u64) -> Self {
        let status = if execution.success {
            OperationStatus::Succeeded
        } else if execution.error_code.map_or(false, |c| c.is_gate_rejection()) {
            OperationStatus::Rejected
        } else {
            OperationStatus::Failed
        };
        Self {
            op_id,
            op_key: op_key.to_string(),
            success: execution.success,
            status,
            message: execution.message,
            error: execution.error,
            error_code: execution.error_code,
            retry_after_seconds: execution.retry_after_seconds,
            idempotent_replay: false,
            duration_ms,
            data: execution.data,
        }
    }

    /// Answer for a duplicate request whose original is still running.
    pub fn in_progress_replay(op_key: &str) -> Self {
        Self {
            op_id: String::new(),
            op_key: op_key.to_string(),
            success: false,
            status: OperationStatus::InProgress,
            message: None,
            error: Some("Operation already in progress for this idempotency key".to_string()),
            error_code: None,
            retry_after_seconds: None,
            idempotent_replay: true,
            duration_ms: 0,
            data: Value::Null,
        }
    }

    pub fn replayed(mut self) -> Self {
        self.idempotent_replay = true;
        self
    }

    pub fn is_rejection(&self) -> bool {
        self.status == OperationStatus::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_rejection_maps_to_rejected() {
        let action = ActionOutcome::failed(ErrorCode::RestartCooldown, "wait").with_retry_after(30);
        let outcome = OperationOutcome::from_execution("id".into(), "server:restart", action.into(), 3);

        assert_eq!(outcome.status, OperationStatus::Rejected);
        assert_eq!(outcome.retry_after_seconds, Some(30));
        assert!(outcome.is_rejection());
    }

    #[test]
    fn test_in_progress_replay_shape() {
        let json = serde_json::to_value(OperationOutcome::in_progress_replay("server:stop")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["idempotent_replay"], true);
    }
}
