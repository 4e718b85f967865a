//! ServerRuntime trait - the OS seam under the supervisor
//!
//! The supervisor decides *what* to do (readiness polling, stop escalation,
//! retry policy, recovery ordering). A `ServerRuntime` only knows *how* to
//! touch the host: launch the start script, look at a PID, probe a port,
//! talk RCON, deliver a signal.
//!
//! [`OsRuntime`] is the production implementation. Tests swap in a fake to
//! drive the supervisor through crashes and hung ports deterministically.

use crate::config::SupervisorConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mcops_common::{ProcessError, ProcessResult, RconResult};
use mcops_process::{process_exists, spawn_detached, ProcessInspector, StopSignal};
use mcops_rcon::{RconClient, RconConfig};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Child;
use tracing::{debug, warn};

const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[async_trait]
pub trait ServerRuntime: Send + Sync {
    /// Whether the start script exists.
    fn start_script_present(&self) -> bool;

    /// Launch the start script detached and return its PID.
    async fn launch(&self) -> ProcessResult<u32>;

    /// PID is alive and its command line identifies the game server.
    fn matches_server(&self, pid: u32) -> bool;

    /// Look for a running server process by command line, whatever PID the
    /// start script reported. A start script that runs java without `exec`
    /// leaves the real server as a child of the PID we launched.
    fn find_server_pid(&self) -> Option<u32>;

    /// When the OS says the process started.
    fn process_started_at(&self, pid: u32) -> Option<DateTime<Utc>>;

    /// Resident memory in bytes.
    fn resident_memory(&self, _pid: u32) -> Option<u64> {
        None
    }

    /// Game port accepts TCP connections.
    async fn port_open(&self) -> bool;

    /// RCON port accepts TCP connections.
    async fn rcon_port_open(&self) -> bool;

    /// RCON is enabled and has a password.
    fn rcon_configured(&self) -> bool;

    /// Run one command over a fresh RCON session.
    async fn rcon_command(&self, command: &str) -> RconResult<String>;

    /// Readiness probe: a cheap command that only a booted server answers.
    async fn probe_rcon(&self) -> RconResult<()> {
        self.rcon_command("list").await.map(|_| ())
    }

    /// Deliver a signal. A vanished process reports `ProcessError::NotFound`.
    fn signal(&self, pid: u32, signal: StopSignal) -> ProcessResult<()>;
}

async fn tcp_port_open(host: &str, port: u16) -> bool {
    matches!(
        tokio::time::timeout(PORT_PROBE_TIMEOUT, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Host implementation backed by `tokio::process`, `nix` and `sysinfo`.
pub struct OsRuntime {
    config: SupervisorConfig,
    inspector: ProcessInspector,
    /// Last child we launched, kept so it can be reaped instead of
    /// lingering as a zombie that still answers `kill(pid, 0)`.
    child: Mutex<Option<Child>>,
}

impl std::fmt::Debug for OsRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsRuntime")
            .field("server_dir", &self.config.server_dir)
            .finish()
    }
}

impl OsRuntime {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            inspector: ProcessInspector::new(),
            child: Mutex::new(None),
        }
    }

    /// Current RCON settings, re-read from `server.properties` unless fixed.
    pub fn rcon_config(&self) -> RconConfig {
        if let Some(fixed) = &self.config.rcon {
            return fixed.clone();
        }
        match RconConfig::from_server_properties(self.config.server_properties_path()) {
            Ok(config) => config,
            Err(e) => {
                warn!("Could not read RCON settings: {}", e);
                RconConfig::default()
            }
        }
    }

    fn reap_child(&self, pid: u32) {
        let mut slot = self.child.lock();
        let Some(child) = slot.as_mut() else {
            return;
        };
        if child.id() != Some(pid) {
            return;
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Reaped server child PID {}: {}", pid, status);
                *slot = None;
            }
            Ok(None) => {}
            Err(e) => debug!("try_wait on PID {} failed: {}", pid, e),
        }
    }
}

#[async_trait]
impl ServerRuntime for OsRuntime {
    fn start_script_present(&self) -> bool {
        self.config.start_script_path().is_file()
    }

    async fn launch(&self) -> ProcessResult<u32> {
        let child = spawn_detached(&self.config.start_script_path(), &self.config.server_dir)?;
        let pid = child
            .id()
            .ok_or_else(|| ProcessError::spawn_failed("child exited before reporting a PID"))?;
        *self.child.lock() = Some(child);
        Ok(pid)
    }

    fn matches_server(&self, pid: u32) -> bool {
        self.reap_child(pid);
        if !matches!(process_exists(pid), Ok(true)) {
            return false;
        }
        self.inspector
            .inspect(pid)
            .map_or(false, |info| info.matches_all(&self.config.process_match))
    }

    fn find_server_pid(&self) -> Option<u32> {
        self.inspector
            .find_matching(&self.config.process_match)
            .map(|info| info.pid)
    }

    fn process_started_at(&self, pid: u32) -> Option<DateTime<Utc>> {
        self.inspector.inspect(pid).and_then(|info| info.started_at)
    }

    fn resident_memory(&self, pid: u32) -> Option<u64> {
        self.inspector.inspect(pid).map(|info| info.memory_bytes)
    }

    async fn port_open(&self) -> bool {
        tcp_port_open(&self.config.health_host, self.config.health_port).await
    }

    async fn rcon_port_open(&self) -> bool {
        let rcon = self.rcon_config();
        rcon.enabled && tcp_port_open(&rcon.host, rcon.port).await
    }

    fn rcon_configured(&self) -> bool {
        self.rcon_config().is_usable()
    }

    async fn rcon_command(&self, command: &str) -> RconResult<String> {
        let rcon = self.rcon_config();
        rcon.ensure_usable()?;
        RconClient::execute_once(&rcon, command).await
    }

    fn signal(&self, pid: u32, signal: StopSignal) -> ProcessResult<()> {
        mcops_process::send_signal(pid, signal)
    }
}
