//! Supervisor configuration.

use mcops_common::duration_serde;
use mcops_rcon::{RconConfig, DEFAULT_GAME_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the server lives and how to tell it is the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Server working directory; relative paths below resolve against it.
    pub server_dir: PathBuf,

    #[serde(default = "default_start_script")]
    pub start_script: PathBuf,

    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    #[serde(default = "default_health_host")]
    pub health_host: String,

    /// Game port probed by `health()`.
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Fixed RCON settings. When absent they are re-read from
    /// `server.properties` on every use so edits take effect without a
    /// control plane restart.
    #[serde(default)]
    pub rcon: Option<RconConfig>,

    /// Substrings that identify the server's command line.
    #[serde(default = "default_process_match")]
    pub process_match: Vec<String>,

    #[serde(default = "default_true")]
    pub require_rcon_ready: bool,

    #[serde(default)]
    pub timing: SupervisorTiming,
}

/// Every wait the supervisor performs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorTiming {
    #[serde(default = "default_ready_timeout", with = "duration_serde")]
    pub ready_timeout: Duration,
    #[serde(default = "default_ready_poll", with = "duration_serde")]
    pub ready_poll: Duration,
    #[serde(default = "default_boot_grace", with = "duration_serde")]
    pub boot_grace: Duration,
    #[serde(default = "default_rcon_stop_wait", with = "duration_serde")]
    pub rcon_stop_wait: Duration,
    #[serde(default = "default_sigterm_wait", with = "duration_serde")]
    pub sigterm_wait: Duration,
    #[serde(default = "default_kill_wait", with = "duration_serde")]
    pub kill_wait: Duration,
    #[serde(default = "default_exit_poll", with = "duration_serde")]
    pub exit_poll: Duration,
    #[serde(default = "default_restart_settle", with = "duration_serde")]
    pub restart_settle: Duration,
    #[serde(default = "default_recover_settle", with = "duration_serde")]
    pub recover_settle: Duration,
    #[serde(default = "default_start_retries")]
    pub start_retries: u32,
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,
    #[serde(default = "default_player_cache_ttl", with = "duration_serde")]
    pub player_cache_ttl: Duration,
}

fn default_start_script() -> PathBuf {
    PathBuf::from("start.sh")
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("server.pid")
}

fn default_health_host() -> String {
    "127.0.0.1".to_string()
}

fn default_health_port() -> u16 {
    DEFAULT_GAME_PORT
}

fn default_process_match() -> Vec<String> {
    vec!["java".to_string(), "paper".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_ready_poll() -> Duration {
    Duration::from_secs(1)
}

fn default_boot_grace() -> Duration {
    Duration::from_secs(20)
}

fn default_rcon_stop_wait() -> Duration {
    Duration::from_secs(30)
}

fn default_sigterm_wait() -> Duration {
    Duration::from_secs(15)
}

fn default_kill_wait() -> Duration {
    Duration::from_secs(1)
}

fn default_exit_poll() -> Duration {
    Duration::from_secs(1)
}

fn default_restart_settle() -> Duration {
    Duration::from_secs(3)
}

fn default_recover_settle() -> Duration {
    Duration::from_secs(2)
}

fn default_start_retries() -> u32 {
    2
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_player_cache_ttl() -> Duration {
    Duration::from_secs(5)
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self {
            ready_timeout: default_ready_timeout(),
            ready_poll: default_ready_poll(),
            boot_grace: default_boot_grace(),
            rcon_stop_wait: default_rcon_stop_wait(),
            sigterm_wait: default_sigterm_wait(),
            kill_wait: default_kill_wait(),
            exit_poll: default_exit_poll(),
            restart_settle: default_restart_settle(),
            recover_settle: default_recover_settle(),
            start_retries: default_start_retries(),
            retry_delay: default_retry_delay(),
            player_cache_ttl: default_player_cache_ttl(),
        }
    }
}

impl SupervisorConfig {
    pub fn new(server_dir: impl Into<PathBuf>) -> Self {
        Self {
            server_dir: server_dir.into(),
            start_script: default_start_script(),
            pid_file: default_pid_file(),
            health_host: default_health_host(),
            health_port: default_health_port(),
            rcon: None,
            process_match: default_process_match(),
            require_rcon_ready: true,
            timing: SupervisorTiming::default(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.server_dir.join(path)
        }
    }

    pub fn start_script_path(&self) -> PathBuf {
        self.resolve(&self.start_script)
    }

    pub fn pid_file_path(&self) -> PathBuf {
        self.resolve(&self.pid_file)
    }

    pub fn server_properties_path(&self) -> PathBuf {
        self.server_dir.join("server.properties")
    }

    pub fn latest_log_path(&self) -> PathBuf {
        self.server_dir.join("logs").join("latest.log")
    }
}
