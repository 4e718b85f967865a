//! Control socket between one-shot commands and the running daemon.
//!
//! One JSON request line per connection, one JSON response line back. The
//! daemon owns the restart gate, the idempotency cache and both
//! schedulers, so a command handled here shares them with everything the
//! schedulers do. Without a daemon the same [`ControlContext`] runs in the
//! command's own process, under the instance lock.

use anyhow::{Context, Result};
use mcops_common::SchedulerResult;
use mcops_operations::{Actor, OperationParams, OperationRegistry};
use mcops_scheduler::{BackupScheduler, RebootScheduler, SchedulerKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const SOCKET_FILE: &str = "mcops.sock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    Trace {
        limit: usize,
    },
    Operation {
        op_key: String,
        #[serde(default)]
        params: OperationParams,
        #[serde(default)]
        idempotency_key: Option<String>,
        actor: Actor,
    },
    Scheduler {
        scheduler: SchedulerKind,
        action: SchedulerAction,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SchedulerAction {
    Status,
    Enable,
    Disable,
    Trigger { reason: String },
    Cancel,
    ClearError,
}

impl SchedulerAction {
    /// Queued for the scheduler's next tick rather than applied at once.
    fn needs_tick(&self) -> bool {
        matches!(self, Self::Trigger { .. } | Self::Cancel | Self::ClearError)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Trigger { .. } => "trigger",
            Self::Cancel => "cancel",
            Self::ClearError => "clear-error",
        }
    }
}

/// `ok` is false when the request itself was refused. An operation that ran
/// and failed is still `ok`; its outcome is in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl ControlResponse {
    fn data<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(data) => Self {
                ok: true,
                message: String::new(),
                data,
            },
            Err(e) => Self::error(format!("Failed to encode response: {}", e)),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            data: Value::Null,
        }
    }

    fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }
}

/// Everything a control request can reach.
pub struct ControlContext {
    registry: Arc<OperationRegistry>,
    reboot: Option<Arc<RebootScheduler>>,
    backup: Option<Arc<BackupScheduler>>,
    ticking: bool,
}

impl ControlContext {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self {
            registry,
            reboot: None,
            backup: None,
            ticking: false,
        }
    }

    /// `ticking` says whether a driver runs the schedulers' ticks. Without
    /// one, trigger, cancel and clear-error would be queued and never seen.
    pub fn with_schedulers(
        mut self,
        reboot: Arc<RebootScheduler>,
        backup: Arc<BackupScheduler>,
        ticking: bool,
    ) -> Self {
        self.reboot = Some(reboot);
        self.backup = Some(backup);
        self.ticking = ticking;
        self
    }

    pub async fn handle(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Status => ControlResponse::data(&self.registry.server().status().await),
            ControlRequest::Trace { limit } => match self.registry.recent_trace(limit).await {
                Ok(records) => ControlResponse::data(&records),
                Err(e) => ControlResponse::error(format!("Failed to read operation trace: {}", e)),
            },
            ControlRequest::Operation {
                op_key,
                params,
                idempotency_key,
                actor,
            } => match self
                .registry
                .execute(&op_key, &actor, params, idempotency_key.as_deref())
                .await
            {
                Ok(outcome) => ControlResponse::data(&outcome),
                Err(e) => ControlResponse::error(format!("{} refused: {}", op_key, e)),
            },
            ControlRequest::Scheduler { scheduler, action } => self.scheduler(scheduler, action).await,
        }
    }

    async fn scheduler(&self, kind: SchedulerKind, action: SchedulerAction) -> ControlResponse {
        if action.needs_tick() && !self.ticking {
            return ControlResponse::error(format!(
                "{} scheduler {} needs the running daemon",
                kind,
                action.name()
            ));
        }

        let applied = match kind {
            SchedulerKind::Reboot => match &self.reboot {
                Some(reboot) => apply_reboot(reboot, &action)
                    .await
                    .map(|message| ControlResponse::data(&reboot.status()).with_message(message)),
                None => return ControlResponse::error("reboot scheduler is not loaded"),
            },
            SchedulerKind::Backup => match &self.backup {
                Some(backup) => apply_backup(backup, &action)
                    .await
                    .map(|message| ControlResponse::data(&backup.status()).with_message(message)),
                None => return ControlResponse::error("backup scheduler is not loaded"),
            },
        };

        match applied {
            Ok(response) => {
                if !response.message.is_empty() {
                    info!("{} scheduler: {}", kind, response.message);
                }
                response
            }
            Err(e) => ControlResponse::error(format!("{} scheduler {}: {}", kind, action.name(), e)),
        }
    }
}

async fn apply_reboot(scheduler: &RebootScheduler, action: &SchedulerAction) -> SchedulerResult<&'static str> {
    match action {
        SchedulerAction::Status => Ok(""),
        SchedulerAction::Enable => scheduler.enable().await.map(|_| "enabled"),
        SchedulerAction::Disable => scheduler.disable().await.map(|_| "disabled"),
        SchedulerAction::Trigger { reason } => scheduler
            .trigger_now(reason.as_str())
            .map(|_| "restart requested for the next tick"),
        SchedulerAction::Cancel => scheduler
            .cancel_countdown()
            .map(|_| "countdown cancel requested for the next tick"),
        SchedulerAction::ClearError => scheduler
            .clear_error()
            .map(|_| "error clear requested for the next tick"),
    }
}

async fn apply_backup(scheduler: &BackupScheduler, action: &SchedulerAction) -> SchedulerResult<&'static str> {
    match action {
        SchedulerAction::Status => Ok(""),
        SchedulerAction::Enable => scheduler.enable().await.map(|_| "enabled"),
        SchedulerAction::Disable => scheduler.disable().await.map(|_| "disabled"),
        SchedulerAction::Trigger { reason } => scheduler
            .trigger_now(reason.as_str())
            .map(|_| "backup requested for the next tick"),
        SchedulerAction::Cancel => scheduler
            .cancel_countdown()
            .map(|_| "countdown cancel requested for the next tick"),
        SchedulerAction::ClearError => scheduler
            .clear_error()
            .map(|_| "error clear requested for the next tick"),
    }
}

/// Bind the control socket, replacing a stale one. Only the instance lock
/// holder may call this. The socket is private to the daemon's user.
pub async fn bind(path: &Path) -> Result<UnixListener> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
    }
    let listener =
        UnixListener::bind(path).with_context(|| format!("Failed to bind control socket {}", path.display()))?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .with_context(|| format!("Failed to restrict {}", path.display()))?;
    Ok(listener)
}

/// Answer requests until `cancel` fires. Each connection gets its own task
/// so a long restart does not hold up a status query.
pub async fn serve(listener: UnixListener, context: Arc<ControlContext>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let context = context.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &context).await {
                            warn!("Control connection failed: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Control socket accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
    debug!("Control socket closed");
}

async fn handle_connection(stream: UnixStream, context: &ControlContext) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await?;
    if line.trim().is_empty() {
        return Ok(());
    }

    let response = match serde_json::from_str::<ControlRequest>(&line) {
        Ok(request) => {
            debug!("Control request: {:?}", request);
            context.handle(request).await
        }
        Err(e) => ControlResponse::error(format!("Malformed request: {}", e)),
    };

    let mut encoded = serde_json::to_vec(&response)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.shutdown().await?;
    Ok(())
}

/// Send one request to the daemon. `Ok(None)` when nothing listens on
/// `path`.
pub async fn send(path: &Path, request: &ControlRequest) -> Result<Option<ControlResponse>> {
    let stream = match UnixStream::connect(path).await {
        Ok(stream) => stream,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
            return Ok(None);
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to connect to {}", path.display())),
    };
    let (reader, mut writer) = stream.into_split();

    let mut encoded = serde_json::to_vec(request)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.shutdown().await?;

    let mut line = String::new();
    BufReader::new(reader)
        .read_line(&mut line)
        .await
        .context("Daemon closed the control connection")?;
    let response = serde_json::from_str(&line).context("Malformed response from the daemon")?;
    Ok(Some(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake_ops::FakeServerOps;
    use mcops_common::ErrorCode;
    use mcops_operations::{
        OperationOutcome, OperationStatus, OperationsConfig, SERVER_RESTART, SERVER_START,
    };
    use mcops_scheduler::{ActivityBoard, RebootState, Scheduler, SchedulerPaths, SchedulerTiming};
    use mcops_supervisor::ServerOps;
    use tempfile::TempDir;

    struct Daemon {
        ops: Arc<FakeServerOps>,
        socket: std::path::PathBuf,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
        _dir: TempDir,
    }

    impl Daemon {
        async fn start(ops: FakeServerOps, schedulers: bool) -> (Self, Option<Arc<RebootScheduler>>) {
            let dir = tempfile::tempdir().unwrap();
            let ops = Arc::new(ops);
            let registry = Arc::new(OperationRegistry::from_config(
                ops.clone() as Arc<dyn ServerOps>,
                &OperationsConfig::default(),
            ));
            let mut context = ControlContext::new(registry.clone());
            let mut reboot = None;
            if schedulers {
                let board = ActivityBoard::new();
                let paths = SchedulerPaths::new(dir.path().join("state"));
                let opened = Arc::new(
                    RebootScheduler::open(registry.clone(), board.clone(), SchedulerTiming::immediate(), paths.clone())
                        .await
                        .unwrap(),
                );
                let backup = Arc::new(
                    BackupScheduler::open(registry, board, SchedulerTiming::immediate(), paths, None)
                        .await
                        .unwrap(),
                );
                context = context.with_schedulers(opened.clone(), backup, true);
                reboot = Some(opened);
            }

            let socket = dir.path().join(SOCKET_FILE);
            let listener = bind(&socket).await.unwrap();
            let cancel = CancellationToken::new();
            let task = tokio::spawn(serve(listener, Arc::new(context), cancel.clone()));
            let daemon = Self {
                ops,
                socket,
                cancel,
                task,
                _dir: dir,
            };
            (daemon, reboot)
        }

        async fn request(&self, request: &ControlRequest) -> ControlResponse {
            send(&self.socket, request).await.unwrap().unwrap()
        }

        async fn stop(self) {
            self.cancel.cancel();
            self.task.await.unwrap();
        }
    }

    fn operation(op_key: &str, params: OperationParams, idempotency_key: Option<&str>) -> ControlRequest {
        ControlRequest::Operation {
            op_key: op_key.to_string(),
            params,
            idempotency_key: idempotency_key.map(str::to_string),
            actor: Actor::admin("ops@example.com"),
        }
    }

    fn outcome(response: ControlResponse) -> OperationOutcome {
        assert!(response.ok, "{}", response.message);
        serde_json::from_value(response.data).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_restarts_from_two_commands_share_the_gate() {
        let ops = FakeServerOps::new();
        ops.set_delay(Duration::from_millis(300));
        let (daemon, _) = Daemon::start(ops, false).await;

        let first = operation(SERVER_RESTART, OperationParams::new().with("source", "deploy"), None);
        let second = operation(SERVER_RESTART, OperationParams::new().with("source", "operator"), None);
        let (a, b) = tokio::join!(daemon.request(&first), daemon.request(&second));
        let outcomes = [outcome(a), outcome(b)];

        assert_eq!(outcomes.iter().filter(|o| o.success).count(), 1);
        let rejected = outcomes.iter().find(|o| !o.success).unwrap();
        assert_eq!(rejected.status, OperationStatus::Rejected);
        assert_eq!(rejected.error_code, Some(ErrorCode::RestartInProgress));
        assert_eq!(daemon.ops.restart_sources().len(), 1);

        daemon.stop().await;
    }

    #[tokio::test]
    async fn test_idempotency_key_replays_across_connections() {
        let ops = FakeServerOps::new();
        ops.set_running(false);
        let (daemon, _) = Daemon::start(ops, false).await;

        let request = operation(SERVER_START, OperationParams::new(), Some("deploy-7"));
        let first = outcome(daemon.request(&request).await);
        let second = outcome(daemon.request(&request).await);

        assert!(first.success);
        assert!(!first.idempotent_replay);
        assert!(second.success);
        assert!(second.idempotent_replay);
        assert_eq!(second.op_id, first.op_id);
        assert_eq!(daemon.ops.calls("start"), 1);

        daemon.stop().await;
    }

    #[tokio::test]
    async fn test_status_trace_and_refusals() {
        let (daemon, _) = Daemon::start(FakeServerOps::new(), false).await;

        let status = daemon.request(&ControlRequest::Status).await;
        assert!(status.ok);
        assert_eq!(status.data["process_running"], Value::Bool(true));

        let trace = daemon.request(&ControlRequest::Trace { limit: 5 }).await;
        assert!(trace.ok);
        assert_eq!(trace.data, Value::Array(Vec::new()));

        let unknown = daemon
            .request(&operation("server:explode", OperationParams::new(), None))
            .await;
        assert!(!unknown.ok);
        assert!(unknown.message.contains("server:explode"));

        let missing = daemon
            .request(&ControlRequest::Scheduler {
                scheduler: SchedulerKind::Reboot,
                action: SchedulerAction::Status,
            })
            .await;
        assert!(!missing.ok);

        daemon.stop().await;
    }

    #[tokio::test]
    async fn test_scheduler_actions_reach_the_daemon() {
        let (daemon, reboot) = Daemon::start(FakeServerOps::new(), true).await;
        let reboot = reboot.unwrap();
        let scheduler = |action| ControlRequest::Scheduler {
            scheduler: SchedulerKind::Reboot,
            action,
        };

        let refused = daemon
            .request(&scheduler(SchedulerAction::Trigger {
                reason: "maintenance".to_string(),
            }))
            .await;
        assert!(!refused.ok);
        assert!(refused.message.contains("disabled"));

        let enabled = daemon.request(&scheduler(SchedulerAction::Enable)).await;
        assert!(enabled.ok);
        assert!(reboot.config().enabled);

        let triggered = daemon
            .request(&scheduler(SchedulerAction::Trigger {
                reason: "maintenance".to_string(),
            }))
            .await;
        assert!(triggered.ok, "{}", triggered.message);
        reboot.tick().await;
        assert_eq!(daemon.ops.calls("restart"), 1);

        let status = daemon.request(&scheduler(SchedulerAction::Status)).await;
        assert_eq!(status.data["state"], Value::String(RebootState::Monitoring.to_string()));

        let not_in_error = daemon.request(&scheduler(SchedulerAction::ClearError)).await;
        assert!(!not_in_error.ok);

        let disabled = daemon.request(&scheduler(SchedulerAction::Disable)).await;
        assert!(disabled.ok);
        assert!(!reboot.config().enabled);

        let backup = daemon
            .request(&ControlRequest::Scheduler {
                scheduler: SchedulerKind::Backup,
                action: SchedulerAction::Status,
            })
            .await;
        assert!(backup.ok);
        assert_eq!(backup.data["state"], Value::String("disabled".to_string()));

        daemon.stop().await;
    }

    #[tokio::test]
    async fn test_queued_actions_refused_without_a_driver() {
        let dir = tempfile::tempdir().unwrap();
        let ops = Arc::new(FakeServerOps::new());
        let registry = Arc::new(OperationRegistry::from_config(
            ops as Arc<dyn ServerOps>,
            &OperationsConfig::default(),
        ));
        let board = ActivityBoard::new();
        let paths = SchedulerPaths::new(dir.path());
        let reboot = Arc::new(
            RebootScheduler::open(registry.clone(), board.clone(), SchedulerTiming::immediate(), paths.clone())
                .await
                .unwrap(),
        );
        let backup = Arc::new(
            BackupScheduler::open(registry.clone(), board, SchedulerTiming::immediate(), paths, None)
                .await
                .unwrap(),
        );
        let context = ControlContext::new(registry).with_schedulers(reboot.clone(), backup, false);

        let enabled = context
            .handle(ControlRequest::Scheduler {
                scheduler: SchedulerKind::Reboot,
                action: SchedulerAction::Enable,
            })
            .await;
        assert!(enabled.ok);
        assert!(reboot.config().enabled);

        let trigger = context
            .handle(ControlRequest::Scheduler {
                scheduler: SchedulerKind::Backup,
                action: SchedulerAction::Trigger {
                    reason: "now".to_string(),
                },
            })
            .await;
        assert!(!trigger.ok);
        assert!(trigger.message.contains("needs the running daemon"));
    }

    #[tokio::test]
    async fn test_send_without_daemon_and_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join(SOCKET_FILE);
        assert!(send(&socket, &ControlRequest::Status).await.unwrap().is_none());

        // A socket file left by a crashed daemon
        drop(std::os::unix::net::UnixListener::bind(&socket).unwrap());
        assert!(send(&socket, &ControlRequest::Status).await.unwrap().is_none());

        let listener = bind(&socket).await.unwrap();
        drop(listener);
    }

    #[test]
    fn test_request_wire_format() {
        let request = ControlRequest::Scheduler {
            scheduler: SchedulerKind::Backup,
            action: SchedulerAction::Trigger {
                reason: "before update".to_string(),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "scheduler");
        assert_eq!(json["data"]["scheduler"], "backup");
        assert_eq!(json["data"]["action"]["action"], "trigger");
        assert_eq!(json["data"]["action"]["reason"], "before update");

        let parsed: ControlRequest =
            serde_json::from_str(r#"{"type":"operation","data":{"op_key":"server:stop","actor":{"id":"bob"}}}"#)
                .unwrap();
        match parsed {
            ControlRequest::Operation {
                op_key,
                params,
                idempotency_key,
                actor,
            } => {
                assert_eq!(op_key, "server:stop");
                assert_eq!(params, OperationParams::new());
                assert!(idempotency_key.is_none());
                assert!(!actor.is_admin);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
