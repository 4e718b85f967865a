//! # mcops Operations
//!
//! The operation registry every lifecycle request passes through, whether
//! it comes from an operator or a scheduler:
//! - a static table of named, permissioned, risk-rated operations
//! - sliding-window rate limiting per actor and operation
//! - an idempotency cache that collapses concurrent duplicates
//! - a durable JSONL trace and a rotating audit log
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use mcops_operations::{Actor, OperationParams, OperationRegistry, OperationsConfig};
//! # async fn run(ops: Arc<dyn mcops_supervisor::ServerOps>) -> mcops_common::OperationResult<()> {
//! let registry = OperationRegistry::from_config(ops, &OperationsConfig::default());
//! let result = registry
//!     .execute("server:restart", &Actor::admin("ops@example.com"), OperationParams::new(), Some("req-42"))
//!     .await?;
//! println!("{} in {}ms", result.status, result.duration_ms);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod catalog;
pub mod command_policy;
pub mod config;
pub mod idempotency;
pub mod outcome;
pub mod params;
pub mod permissions;
pub mod rate_limit;
pub mod registry;
pub mod trace;

pub use audit::AuditLog;
pub use catalog::{
    find_operation, OperationSpec, RiskLevel, OPERATIONS, SERVER_COMMAND, SERVER_RECOVER,
    SERVER_RESTART, SERVER_START, SERVER_STOP,
};
pub use config::OperationsConfig;
pub use idempotency::IdempotencyCache;
pub use outcome::{ExecutionOutcome, OperationOutcome, OperationStatus};
pub use params::OperationParams;
pub use permissions::{Actor, PermissionChecker, StaticPermissions};
pub use rate_limit::RateLimiter;
pub use registry::OperationRegistry;
pub use trace::{OperationTrace, TraceRecord, TraceStatus};
