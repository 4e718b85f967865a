//! Registry configuration.

use crate::audit::{DEFAULT_KEEP, DEFAULT_MAX_BYTES};
use mcops_common::duration_serde;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationsConfig {
    /// Requests admitted per actor and operation inside `rate_limit_window`.
    #[serde(default = "default_rate_limit_count")]
    pub rate_limit_count: usize,

    #[serde(default = "default_rate_limit_window", with = "duration_serde")]
    pub rate_limit_window: Duration,

    #[serde(default = "default_idempotency_ttl", with = "duration_serde")]
    pub idempotency_ttl: Duration,

    /// Append-only JSONL trace. No trace is written when unset.
    #[serde(default)]
    pub trace_path: Option<PathBuf>,

    #[serde(default)]
    pub audit_path: Option<PathBuf>,

    #[serde(default = "default_audit_max_bytes")]
    pub audit_max_bytes: u64,

    #[serde(default = "default_audit_keep")]
    pub audit_keep: usize,

    /// Actor id to granted permission keys. Admin actors need no entry.
    #[serde(default)]
    pub permissions: HashMap<String, Vec<String>>,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            rate_limit_count: default_rate_limit_count(),
            rate_limit_window: default_rate_limit_window(),
            idempotency_ttl: default_idempotency_ttl(),
            trace_path: None,
            audit_path: None,
            audit_max_bytes: default_audit_max_bytes(),
            audit_keep: default_audit_keep(),
            permissions: HashMap::new(),
        }
    }
}

fn default_rate_limit_count() -> usize {
    10
}

fn default_rate_limit_window() -> Duration {
    Duration::from_secs(60)
}

fn default_idempotency_ttl() -> Duration {
    Duration::from_secs(900)
}

fn default_audit_max_bytes() -> u64 {
    DEFAULT_MAX_BYTES
}

fn default_audit_keep() -> usize {
    DEFAULT_KEEP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: OperationsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.rate_limit_count, 10);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.idempotency_ttl, Duration::from_secs(900));
        assert!(config.trace_path.is_none());
    }

    #[test]
    fn test_human_durations() {
        let config: OperationsConfig = serde_json::from_str(
            r#"{"rate_limit_window": "2m", "idempotency_ttl": "1h", "permissions": {"bob": ["server:start"]}}"#,
        )
        .unwrap();
        assert_eq!(config.rate_limit_window, Duration::from_secs(120));
        assert_eq!(config.idempotency_ttl, Duration::from_secs(3600));
        assert_eq!(config.permissions["bob"], vec!["server:start".to_string()]);
    }
}
