//! One-shot commands. Each is sent to the running daemon over its control
//! socket so it shares the daemon's restart gate, idempotency cache and
//! schedulers. With no daemon, the command runs here under the instance
//! lock. Lifecycle actions go through the operation registry as the
//! configured operator and print the JSON result.

use crate::config::McopsConfig;
use crate::control::{self, ControlRequest, ControlResponse, SchedulerAction};
use crate::daemon::local_context;
use crate::lock::InstanceLock;
use anyhow::{anyhow, bail, Context, Result};
use mcops_operations::{
    Actor, OperationOutcome, OperationParams, TraceRecord, SERVER_COMMAND, SERVER_RECOVER, SERVER_RESTART,
    SERVER_START, SERVER_STOP,
};
use mcops_scheduler::SchedulerKind;
use serde::Serialize;
use tracing::debug;

/// What a one-shot invocation asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Status,
    Start,
    Stop { force: bool },
    Restart { source: Option<String> },
    Recover,
    Command { text: String },
    Trace { limit: usize },
    Scheduler {
        scheduler: SchedulerKind,
        action: SchedulerAction,
    },
}

impl Request {
    /// Registry key and parameters, for the requests that are operations.
    pub fn operation(&self) -> Option<(&'static str, OperationParams)> {
        match self {
            Self::Status | Self::Trace { .. } | Self::Scheduler { .. } => None,
            Self::Start => Some((SERVER_START, OperationParams::new())),
            Self::Stop { force } => Some((SERVER_STOP, OperationParams::new().with("force", *force))),
            Self::Restart { source } => {
                let params = match source {
                    Some(source) => OperationParams::new().with("source", source.as_str()),
                    None => OperationParams::new(),
                };
                Some((SERVER_RESTART, params))
            }
            Self::Recover => Some((SERVER_RECOVER, OperationParams::new())),
            Self::Command { text } => Some((SERVER_COMMAND, OperationParams::new().with("command", text.as_str()))),
        }
    }

    /// The wire form of this request, run as `actor`.
    pub fn into_control(self, actor: Actor, idempotency_key: Option<&str>) -> ControlRequest {
        if let Some((op_key, params)) = self.operation() {
            return ControlRequest::Operation {
                op_key: op_key.to_string(),
                params,
                idempotency_key: idempotency_key.map(str::to_string),
                actor,
            };
        }
        match self {
            Self::Trace { limit } => ControlRequest::Trace { limit },
            Self::Scheduler { scheduler, action } => ControlRequest::Scheduler { scheduler, action },
            _ => ControlRequest::Status,
        }
    }
}

pub async fn run(config: &McopsConfig, request: Request, idempotency_key: Option<&str>) -> Result<()> {
    let control = request.into_control(config.operator.actor(), idempotency_key);
    let socket = config.control_socket();

    let response = match control::send(&socket, &control).await? {
        Some(response) => response,
        None => {
            debug!("No daemon on {}, running locally", socket.display());
            let state_dir = config.scheduler.paths().dir().to_path_buf();
            let Some(_lock) = InstanceLock::try_acquire(&state_dir)? else {
                bail!(
                    "the mcops daemon holds {} but is not answering on {}",
                    state_dir.join(crate::lock::LOCK_FILE).display(),
                    socket.display()
                );
            };
            let with_schedulers = matches!(control, ControlRequest::Scheduler { .. });
            local_context(config, with_schedulers).await?.handle(control.clone()).await
        }
    };
    render(&control, response)
}

fn render(request: &ControlRequest, response: ControlResponse) -> Result<()> {
    if !response.ok {
        bail!("{}", response.message);
    }
    match request {
        ControlRequest::Operation { .. } => {
            let outcome: OperationOutcome =
                serde_json::from_value(response.data).context("Malformed operation outcome")?;
            print_json(&outcome)?;
            check_outcome(&outcome)
        }
        ControlRequest::Trace { .. } => {
            let records: Vec<TraceRecord> =
                serde_json::from_value(response.data).context("Malformed trace records")?;
            for record in records {
                println!("{}", serde_json::to_string(&record)?);
            }
            Ok(())
        }
        ControlRequest::Scheduler { .. } => {
            if !response.message.is_empty() {
                eprintln!("{}", response.message);
            }
            print_json(&response.data)
        }
        ControlRequest::Status => print_json(&response.data),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Non-zero exit for anything but success.
fn check_outcome(outcome: &OperationOutcome) -> Result<()> {
    if outcome.success {
        return Ok(());
    }
    let reason = outcome
        .error
        .clone()
        .unwrap_or_else(|| outcome.status.to_string());
    match outcome.retry_after_seconds {
        Some(seconds) => Err(anyhow!("{} {}: {} (retry in {}s)", outcome.op_key, outcome.status, reason, seconds)),
        None => Err(anyhow!("{} {}: {}", outcome.op_key, outcome.status, reason)),
    }
}
