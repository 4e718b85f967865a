//! Operation registry - the single entry point for running server operations
//!
//! `execute` runs, in order: lookup, permission check, parameter validation,
//! rate limit, idempotency admission, trace `started`, preflight, executor,
//! trace terminal record, audit line. Everything before the idempotency
//! admission is side-effect free: a forbidden or rate-limited request leaves
//! no trace.

use crate::audit::AuditLog;
use crate::catalog::{find_operation, OperationSpec, OPERATIONS};
use crate::config::OperationsConfig;
use crate::idempotency::{Admission, IdempotencyCache};
use crate::outcome::{ExecutionOutcome, OperationOutcome, OperationStatus};
use crate::params::OperationParams;
use crate::permissions::{Actor, PermissionChecker, StaticPermissions};
use crate::rate_limit::RateLimiter;
use crate::trace::{OperationTrace, TraceRecord, TraceStatus};
use chrono::Utc;
use mcops_common::{OperationError, OperationResult};
use mcops_supervisor::ServerOps;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const RATE_LIMIT_BUCKET: &str = "operations";
const AUDIT_TARGET: &str = "server";

pub struct OperationRegistry {
    ops: Arc<dyn ServerOps>,
    permissions: Arc<dyn PermissionChecker>,
    limiter: RateLimiter,
    idempotency: IdempotencyCache,
    trace: Option<OperationTrace>,
    audit: Option<AuditLog>,
}

impl OperationRegistry {
    pub fn new(
        ops: Arc<dyn ServerOps>,
        permissions: Arc<dyn PermissionChecker>,
        config: &OperationsConfig,
    ) -> Self {
        Self {
            ops,
            permissions,
            limiter: RateLimiter::new(config.rate_limit_count, config.rate_limit_window),
            idempotency: IdempotencyCache::new(config.idempotency_ttl),
            trace: config.trace_path.clone().map(OperationTrace::new),
            audit: config
                .audit_path
                .clone()
                .map(|path| AuditLog::with_rotation(path, config.audit_max_bytes, config.audit_keep)),
        }
    }

    /// Registry whose permissions come from `config.permissions`.
    pub fn from_config(ops: Arc<dyn ServerOps>, config: &OperationsConfig) -> Self {
        let permissions = StaticPermissions::from_grants(config.permissions.clone());
        Self::new(ops, Arc::new(permissions), config)
    }

    pub fn operations(&self) -> &'static [OperationSpec] {
        OPERATIONS
    }

    pub fn server(&self) -> &Arc<dyn ServerOps> {
        &self.ops
    }

    pub async fn execute(
        &self,
        op_key: &str,
        actor: &Actor,
        params: OperationParams,
        idempotency_key: Option<&str>,
    ) -> OperationResult<OperationOutcome> {
        let spec = find_operation(op_key).ok_or_else(|| OperationError::unknown(op_key))?;
        let actor_label = actor.label();

        if spec.admin_only && !actor.is_admin {
            warn!("⛔ {} denied {}: admin only", actor_label, op_key);
            return Err(OperationError::forbidden(actor_label, op_key, "admin"));
        }
        if !actor.is_admin && !self.permissions.has_permission(actor, spec.permission).await {
            warn!("⛔ {} denied {}: missing {}", actor_label, op_key, spec.permission);
            return Err(OperationError::forbidden(actor_label, op_key, spec.permission));
        }

        params
            .validate(spec.params)
            .map_err(|(name, reason)| OperationError::invalid_params(op_key, name, reason))?;

        if let Err(retry_after) = self.limiter.check(RATE_LIMIT_BUCKET, actor_label, op_key) {
            warn!("{} rate limited on {} (retry in {}s)", actor_label, op_key, retry_after);
            return Err(OperationError::rate_limited(op_key, retry_after));
        }

        let idempotency_key = idempotency_key.map(str::trim).filter(|k| !k.is_empty());
        let ticket = match idempotency_key {
            Some(key) => {
                let cache_key = IdempotencyCache::cache_key(op_key, actor_label, key);
                match self.idempotency.begin(&cache_key) {
                    Admission::Fresh(ticket) => Some(ticket),
                    Admission::InProgress => {
                        info!("{} {} still running for key {}", actor_label, op_key, key);
                        return Ok(OperationOutcome::in_progress_replay(op_key));
                    }
                    Admission::Replay(cached) => {
                        debug!("Replaying {} for key {}", op_key, key);
                        return Ok(cached.replayed());
                    }
                }
            }
            None => None,
        };

        let op_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!("▶️  {} running {} ({})", actor_label, op_key, op_id);

        let mut record = TraceRecord {
            op_key: op_key.to_string(),
            op_id: op_id.clone(),
            actor: actor_label.to_string(),
            idempotency_key: idempotency_key.map(str::to_string),
            started_at,
            finished_at: None,
            status: TraceStatus::Started,
            error: String::new(),
        };
        self.write_trace(&record).await;

        let execution = match spec.preflight.map(|preflight| preflight(&params)) {
            Some(Err(failure)) => {
                info!("{} preflight refused: {}", op_key, failure.message);
                ExecutionOutcome::failed(failure.code, failure.message)
            }
            _ => (spec.executor)(self.ops.as_ref(), &params).await,
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        let result = OperationOutcome::from_execution(op_id.clone(), op_key, execution, duration_ms);

        record.finished_at = Some(Utc::now());
        record.status = match result.status {
            OperationStatus::Succeeded => TraceStatus::Succeeded,
            OperationStatus::Rejected => TraceStatus::Rejected,
            OperationStatus::Failed | OperationStatus::InProgress => TraceStatus::Failed,
        };
        record.error = result.error.clone().unwrap_or_default();
        self.write_trace(&record).await;

        if let Some(audit) = &self.audit {
            if let Err(e) = audit
                .record(actor_label, op_key, AUDIT_TARGET, result.status.as_str(), Some(&op_id))
                .await
            {
                warn!("Failed to write audit log: {}", e);
            }
        }

        if result.success {
            info!("✅ {} {} in {}ms", op_key, result.status, duration_ms);
        } else {
            warn!(
                "❌ {} {}: {} ({}ms)",
                op_key,
                result.status,
                result.error.as_deref().unwrap_or("no detail"),
                duration_ms
            );
        }

        if let Some(ticket) = ticket {
            ticket.finish(result.clone());
        }
        Ok(result)
    }

    /// Newest trace records, newest first. Empty when no trace is configured.
    pub async fn recent_trace(&self, limit: usize) -> std::io::Result<Vec<TraceRecord>> {
        match &self.trace {
            Some(trace) => trace.read_recent(limit).await,
            None => Ok(Vec::new()),
        }
    }

    async fn write_trace(&self, record: &TraceRecord) {
        if let Some(trace) = &self.trace {
            if let Err(e) = trace.append(record).await {
                warn!("Failed to append to {}: {}", trace.path().display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{SERVER_COMMAND, SERVER_RESTART, SERVER_START, SERVER_STOP};
    use fake_ops::FakeServerOps;
    use mcops_common::{ActionOutcome, ErrorCode};
    use mcops_supervisor::GateConfig;
    use std::time::Duration;

    struct Fixture {
        ops: Arc<FakeServerOps>,
        registry: Arc<OperationRegistry>,
        _dir: tempfile::TempDir,
    }

    fn fixture_with(ops: FakeServerOps) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = OperationsConfig {
            trace_path: Some(dir.path().join("operation_state.jsonl")),
            audit_path: Some(dir.path().join("audit.log")),
            ..OperationsConfig::default()
        };
        let ops = Arc::new(ops);
        let permissions = StaticPermissions::new()
            .grant("staff@example.com", SERVER_RESTART)
            .grant("staff@example.com", SERVER_START);
        let registry = OperationRegistry::new(ops.clone(), Arc::new(permissions), &config);
        Fixture {
            ops,
            registry: Arc::new(registry),
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeServerOps::new())
    }

    fn staff() -> Actor {
        Actor::new("staff@example.com")
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let f = fixture();
        let err = f
            .registry
            .execute("server:explode", &Actor::admin("root"), OperationParams::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::UnknownOperation { .. }));
    }

    #[tokio::test]
    async fn test_forbidden_leaves_no_trace() {
        let f = fixture();

        // admin_only operation
        let err = f
            .registry
            .execute(SERVER_STOP, &staff(), OperationParams::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Forbidden { .. }));

        // missing grant
        let err = f
            .registry
            .execute(SERVER_START, &Actor::new("guest"), OperationParams::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Forbidden { .. }));

        assert_eq!(f.ops.calls("stop"), 0);
        assert!(f.registry.recent_trace(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_params_rejected_before_execution() {
        let f = fixture();
        let params = OperationParams::new().with("force", "yes");
        let err = f
            .registry
            .execute(SERVER_STOP, &Actor::admin("root"), params, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidParams { .. }));
        assert_eq!(f.ops.calls("stop"), 0);
    }

    #[tokio::test]
    async fn test_success_writes_started_and_terminal_records() {
        let f = fixture();
        let params = OperationParams::new().with("source", "staff-ui");
        let result = f
            .registry
            .execute(SERVER_RESTART, &staff(), params, Some("req-1"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.status, OperationStatus::Succeeded);
        assert!(!result.idempotent_replay);
        assert_eq!(f.ops.restart_sources(), vec!["staff-ui".to_string()]);

        let records = f.registry.recent_trace(10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, TraceStatus::Succeeded);
        assert!(records[0].finished_at.is_some());
        assert_eq!(records[1].status, TraceStatus::Started);
        assert_eq!(records[0].op_id, result.op_id);
        assert_eq!(records[0].idempotency_key.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_concurrent_same_key_runs_once() {
        let f = fixture();
        f.ops.set_delay(Duration::from_millis(200));

        let first = {
            let registry = f.registry.clone();
            tokio::spawn(async move {
                registry
                    .execute(SERVER_RESTART, &staff(), OperationParams::new(), Some("same"))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = f
            .registry
            .execute(SERVER_RESTART, &staff(), OperationParams::new(), Some("same"))
            .await
            .unwrap();
        assert_eq!(second.status, OperationStatus::InProgress);
        assert!(!second.success);
        assert!(second.idempotent_replay);

        let first = first.await.unwrap().unwrap();
        assert!(first.success);
        assert_eq!(f.ops.calls("restart"), 1);

        let third = f
            .registry
            .execute(SERVER_RESTART, &staff(), OperationParams::new(), Some("same"))
            .await
            .unwrap();
        assert!(third.idempotent_replay);
        assert_eq!(third.op_id, first.op_id);
        assert_eq!(third.status, first.status);
        assert_eq!(f.ops.calls("restart"), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_eleventh_call() {
        let f = fixture();
        let admin = Actor::admin("root");
        for _ in 0..10 {
            let params = OperationParams::new().with("command", "list");
            f.registry.execute(SERVER_COMMAND, &admin, params, None).await.unwrap();
        }
        let params = OperationParams::new().with("command", "list");
        let err = f.registry.execute(SERVER_COMMAND, &admin, params, None).await.unwrap_err();
        match err {
            OperationError::RateLimited {
                retry_after_seconds, ..
            } => assert!(retry_after_seconds >= 1 && retry_after_seconds <= 60),
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert_eq!(f.ops.calls("send_command"), 10);
    }

    #[tokio::test]
    async fn test_dangerous_command_stops_at_preflight() {
        let f = fixture();
        let params = OperationParams::new().with("command", "/stop");
        let result = f
            .registry
            .execute(SERVER_COMMAND, &Actor::admin("root"), params, None)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.status, OperationStatus::Failed);
        assert_eq!(result.error_code, Some(ErrorCode::DangerousCommand));
        assert_eq!(f.ops.calls("send_command"), 0);

        let records = f.registry.recent_trace(1).await.unwrap();
        assert_eq!(records[0].status, TraceStatus::Failed);
        assert!(records[0].error.contains("stop"));
    }

    #[tokio::test]
    async fn test_gate_cooldown_is_a_rejection() {
        let f = fixture_with(FakeServerOps::with_gate(GateConfig::default()));

        let first = f
            .registry
            .execute(SERVER_RESTART, &staff(), OperationParams::new(), None)
            .await
            .unwrap();
        assert!(first.success);

        let second = f
            .registry
            .execute(SERVER_RESTART, &staff(), OperationParams::new(), None)
            .await
            .unwrap();
        assert_eq!(second.status, OperationStatus::Rejected);
        assert_eq!(second.error_code, Some(ErrorCode::RestartCooldown));
        assert!(second.retry_after_seconds.unwrap() > 0);

        let records = f.registry.recent_trace(1).await.unwrap();
        assert_eq!(records[0].status, TraceStatus::Rejected);
    }

    #[tokio::test]
    async fn test_execution_failure_is_recorded() {
        let f = fixture();
        f.ops.queue_restart(ActionOutcome::failed(
            ErrorCode::ProcessExitedEarly,
            "Server process exited during startup",
        ));

        let result = f
            .registry
            .execute(SERVER_RESTART, &staff(), OperationParams::new(), None)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.status, OperationStatus::Failed);
        assert_eq!(result.error_code, Some(ErrorCode::ProcessExitedEarly));

        let records = f.registry.recent_trace(1).await.unwrap();
        assert_eq!(records[0].status, TraceStatus::Failed);
        assert_eq!(records[0].error, "Server process exited during startup");
    }
}
