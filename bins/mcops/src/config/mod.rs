//! Daemon configuration file.
//!
//! ```yaml
//! server:
//!   server_dir: /srv/minecraft
//!   health_port: 25565
//! gate:
//!   cooldown: 2m
//! operations:
//!   trace_path: /var/lib/mcops/operation_state.jsonl
//!   audit_path: /var/lib/mcops/audit.log
//! scheduler:
//!   state_dir: /var/lib/mcops
//!   storage:
//!     remote_dir: /mnt/drive/minecraft-backups
//!     credentials_path: /etc/mcops/service_account.json
//! logging:
//!   level: info
//! ```

mod validation;

use anyhow::{Context, Result};
use mcops_operations::{Actor, OperationsConfig};
use mcops_scheduler::SchedulerSettings;
use mcops_supervisor::{GateConfig, SupervisorConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McopsConfig {
    pub server: SupervisorConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub operations: OperationsConfig,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub console: ConsoleSettings,

    #[serde(default)]
    pub operator: OperatorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Identity of whoever runs one-shot commands on this host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default = "default_operator_id")]
    pub id: String,
    #[serde(default = "default_true")]
    pub admin: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            id: default_operator_id(),
            admin: true,
        }
    }
}

impl OperatorConfig {
    pub fn actor(&self) -> Actor {
        if self.admin {
            Actor::admin(&self.id)
        } else {
            Actor::new(&self.id)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl McopsConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: McopsConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Socket the daemon answers one-shot commands on.
    pub fn control_socket(&self) -> PathBuf {
        self.scheduler.state_dir.join(crate::control::SOCKET_FILE)
    }
}

fn default_true() -> bool {
    true
}

fn default_operator_id() -> String {
    "local-operator".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_minimal_config() {
        let config = McopsConfig::load_from_string("server:\n  server_dir: /srv/minecraft\n").unwrap();

        assert_eq!(config.gate.cooldown, Duration::from_secs(120));
        assert_eq!(config.operations.rate_limit_count, 10);
        assert!(config.scheduler.storage.is_none());
        assert!(config.console.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.operator.actor().is_admin);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
server:
  server_dir: /srv/minecraft
  health_port: 25566
gate:
  cooldown: 5m
  breaker_threshold: 5
operations:
  rate_limit_count: 3
  rate_limit_window: 30s
  trace_path: /var/lib/mcops/operation_state.jsonl
  permissions:
    helper@example.com: ["server:start", "server:restart"]
scheduler:
  state_dir: /var/lib/mcops
  timing:
    countdown_tick: 500ms
  storage:
    remote_dir: /mnt/drive/backups
    credentials_path: /etc/mcops/sa.json
operator:
  id: ops@example.com
  admin: false
logging:
  level: debug
"#;
        let config = McopsConfig::load_from_string(yaml).unwrap();
        assert_eq!(config.server.health_port, 25566);
        assert_eq!(config.gate.cooldown, Duration::from_secs(300));
        assert_eq!(config.gate.breaker_threshold, 5);
        assert_eq!(config.operations.rate_limit_window, Duration::from_secs(30));
        assert_eq!(config.operations.permissions["helper@example.com"].len(), 2);
        assert_eq!(config.scheduler.timing.countdown_tick, Duration::from_millis(500));
        assert!(config.scheduler.storage.is_some());
        assert!(!config.operator.actor().is_admin);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_server_section() {
        let err = McopsConfig::load_from_string("logging:\n  level: info\n").unwrap_err();
        assert!(err.to_string().contains("parse"));
    }
}
