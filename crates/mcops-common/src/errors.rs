//! Error types for the mcops control plane.
//!
//! Hard failures are `Err` values built from the enums below. Soft outcomes
//! (a restart rejected by the gate, an idempotent replay, a server that did
//! not become ready) are *not* errors: they travel as values carrying an
//! [`ErrorCode`](crate::types::ErrorCode) so callers can render a wait state
//! instead of a generic failure.
//!
//! Each layer owns one enum:
//!
//! | Layer               | Enum              | Examples                              |
//! |---------------------|-------------------|---------------------------------------|
//! | Remote console      | [`RconError`]     | connection refused, bad password      |
//! | OS process plumbing | [`ProcessError`]  | unreadable PID file, signal failure   |
//! | Operation registry  | [`OperationError`]| unknown key, forbidden, rate limited  |
//! | Schedulers          | [`SchedulerError`]| state file corrupt, archive failure   |
//!
//! ```rust
//! use mcops_common::{Error, Result};
//!
//! fn load() -> Result<()> {
//!     Err(Error::not_found("reboot_scheduler_config.json"))
//! }
//!
//! fn caller() -> Result<()> {
//!     load()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type alias for general mcops operations.
pub type Result<T> = std::result::Result<T, Error>;

/// General error type shared by helpers that are not tied to one layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A requested resource was not found.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Invalid input or configuration.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Internal error (shouldn't happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        source: Box<Error>,
    },
}

impl Error {
    /// Creates a NotFound error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Adds context to an error.
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }
}

// Convenience methods for Result types
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}

// ==============================================================================
// Remote Console Errors
// ==============================================================================

/// Errors raised by the remote console client.
///
/// Every kind is distinguishable so the supervisor can decide on retries;
/// the client itself never retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RconError {
    #[error("Remote console connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    #[error("Remote console authentication rejected by {addr}")]
    Auth { addr: String },

    #[error("Remote console timed out during {operation} after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Remote console framing error: {reason}")]
    Fragment { reason: String },

    #[error("Remote console is not configured: {reason}")]
    NotConfigured { reason: String },
}

impl RconError {
    pub fn connection(addr: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Connection {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }

    pub fn auth(addr: impl Into<String>) -> Self {
        Self::Auth { addr: addr.into() }
    }

    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms: after.as_millis() as u64,
        }
    }

    pub fn fragment(reason: impl Into<String>) -> Self {
        Self::Fragment {
            reason: reason.into(),
        }
    }

    pub fn not_configured(reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, used in readiness diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Auth { .. } => "auth",
            Self::Timeout { .. } => "timeout",
            Self::Fragment { .. } => "fragment",
            Self::NotConfigured { .. } => "not_configured",
        }
    }
}

/// Result type for remote console operations.
pub type RconResult<T> = std::result::Result<T, RconError>;

// ==============================================================================
// Process Errors
// ==============================================================================

/// OS-level process errors (PID file, launching, signals).
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error("Process not found: pid {pid}")]
    NotFound { pid: u32 },

    #[error("Process spawn failed: {reason}")]
    SpawnFailed { reason: String },

    #[error("Process stop failed: pid {pid} - {reason}")]
    StopFailed { pid: u32, reason: String },

    #[error("Process check failed: pid {pid} - {reason}")]
    CheckFailed { pid: u32, reason: String },

    #[error("PID file error: {path} - {reason}")]
    PidFile { path: String, reason: String },
}

impl ProcessError {
    pub fn not_found(pid: u32) -> Self {
        Self::NotFound { pid }
    }

    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    pub fn stop_failed(pid: u32, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            pid,
            reason: reason.into(),
        }
    }

    pub fn check_failed(pid: u32, reason: impl Into<String>) -> Self {
        Self::CheckFailed {
            pid,
            reason: reason.into(),
        }
    }

    pub fn pid_file(path: impl AsRef<std::path::Path>, reason: impl std::fmt::Display) -> Self {
        Self::PidFile {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

// ==============================================================================
// Operation Registry Errors
// ==============================================================================

/// Registry-layer rejections. None of these has side effects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("Unknown operation: {key}")]
    UnknownOperation { key: String },

    #[error("Actor '{actor}' is not allowed to run {key} (requires {permission})")]
    Forbidden {
        actor: String,
        key: String,
        permission: String,
    },

    #[error("Too many requests for {key}; retry after {retry_after_seconds}s")]
    RateLimited {
        key: String,
        retry_after_seconds: u64,
    },

    #[error("Invalid parameter '{name}' for {key}: {reason}")]
    InvalidParams {
        key: String,
        name: String,
        reason: String,
    },
}

impl OperationError {
    pub fn unknown(key: impl Into<String>) -> Self {
        Self::UnknownOperation { key: key.into() }
    }

    pub fn forbidden(
        actor: impl Into<String>,
        key: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self::Forbidden {
            actor: actor.into(),
            key: key.into(),
            permission: permission.into(),
        }
    }

    pub fn rate_limited(key: impl Into<String>, retry_after_seconds: u64) -> Self {
        Self::RateLimited {
            key: key.into(),
            retry_after_seconds,
        }
    }

    pub fn invalid_params(
        key: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParams {
            key: key.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// HTTP-equivalent status for the excluded web layer.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnknownOperation { .. } => 404,
            Self::Forbidden { .. } => 403,
            Self::RateLimited { .. } => 429,
            Self::InvalidParams { .. } => 400,
        }
    }
}

/// Result type for registry operations.
pub type OperationResult<T> = std::result::Result<T, OperationError>;

// ==============================================================================
// Scheduler Errors
// ==============================================================================

/// Scheduler failures. A failure inside a maintenance cycle also lands the
/// scheduler in its sticky `error` state; this enum is the cause.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler state file error: {path} - {reason}")]
    StateFile { path: String, reason: String },

    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    #[error("Archive failed: {0}")]
    Archive(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Remote storage error: {0}")]
    Storage(String),

    #[error("Server did not stop within {seconds}s")]
    StopTimeout { seconds: u64 },

    #[error("Operation {key} failed: {reason}")]
    Operation { key: String, reason: String },

    /// A manual request that does not fit the scheduler's current state.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The scheduler was disabled or its cycle superseded mid-flight.
    #[error("Cycle cancelled: {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchedulerError {
    pub fn state_file(path: impl AsRef<std::path::Path>, reason: impl std::fmt::Display) -> Self {
        Self::StateFile {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn operation(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Operation {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::not_found("test");
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_error_context() {
        let err = Error::not_found("resource").context("Operation failed");
        let error_message = err.to_string();
        assert!(error_message.contains("Operation failed"));
        assert!(error_message.contains("resource"));
    }

    #[test]
    fn test_rcon_error_kinds_are_distinct() {
        let auth = RconError::auth("127.0.0.1:25575");
        let conn = RconError::connection("127.0.0.1:25575", "refused");
        let timeout = RconError::timeout("send", std::time::Duration::from_millis(1500));

        assert_eq!(auth.kind(), "auth");
        assert_eq!(conn.kind(), "connection");
        assert_eq!(timeout.kind(), "timeout");
        assert_ne!(auth, conn);
        assert_eq!(
            format!("{}", timeout),
            "Remote console timed out during send after 1500ms"
        );
    }

    #[test]
    fn test_operation_error_http_status() {
        assert_eq!(OperationError::unknown("nope").http_status(), 404);
        assert_eq!(
            OperationError::forbidden("staff", "server:stop", "server:stop").http_status(),
            403
        );
        assert_eq!(
            OperationError::rate_limited("server:start", 12).http_status(),
            429
        );
    }

    #[test]
    fn test_process_error_construction() {
        let error = ProcessError::not_found(4242);
        assert_eq!(format!("{}", error), "Process not found: pid 4242");

        let error = ProcessError::spawn_failed("start.sh missing");
        assert!(format!("{}", error).contains("spawn failed"));
    }
}
