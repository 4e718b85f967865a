//! Simulated game server host.

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use fake_rcon::FakeRconServer;
use mcops_common::{ProcessError, ProcessResult, RconError, RconResult};
use mcops_process::StopSignal;
use mcops_rcon::{RconClient, RconConfig};
use mcops_supervisor::ServerRuntime;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const RCON_PASSWORD: &str = "e2e-secret";

const RCON_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct HostState {
    next_pid: u32,
    alive: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    launches: u32,
    signals: Vec<StopSignal>,
    ignore_stop: bool,
}

/// One fake server process at a time, reachable over RCON while alive.
pub struct SimulatedHost {
    rcon: FakeRconServer,
    state: Arc<Mutex<HostState>>,
    log_path: PathBuf,
}

impl SimulatedHost {
    pub async fn start(server_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(server_dir.join("logs"))?;
        let log_path = server_dir.join("logs").join("latest.log");
        let rcon = FakeRconServer::start(RCON_PASSWORD).await?;
        let state = Arc::new(Mutex::new(HostState {
            next_pid: 4000,
            alive: None,
            started_at: None,
            launches: 0,
            signals: Vec::new(),
            ignore_stop: false,
        }));

        let hook_state = state.clone();
        let hook_log = log_path.clone();
        rcon.on_stop(move || {
            let mut state = hook_state.lock();
            if state.ignore_stop {
                return;
            }
            state.alive = None;
            append_log(&hook_log, "[Server thread/INFO]: Stopping server");
        });

        Ok(Self { rcon, state, log_path })
    }

    pub fn rcon(&self) -> &FakeRconServer {
        &self.rcon
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn set_players(&self, online: u32) {
        self.rcon.set_players(online, 20);
    }

    /// Pretend the current process has been up since `at`.
    pub fn set_started_at(&self, at: DateTime<Utc>) {
        self.state.lock().started_at = Some(at);
    }

    /// Make the process ignore `stop` over RCON, like a hung server.
    pub fn set_ignore_stop(&self, ignore: bool) {
        self.state.lock().ignore_stop = ignore;
    }

    pub fn launches(&self) -> u32 {
        self.state.lock().launches
    }

    pub fn signals(&self) -> Vec<StopSignal> {
        self.state.lock().signals.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().alive.is_some()
    }

    /// Server commands that reached the console, in order.
    pub fn console_commands(&self) -> Vec<String> {
        self.rcon.commands()
    }
}

fn append_log(path: &Path, message: &str) {
    let line = format!("[{}] {}\n", Local::now().format("%H:%M:%S"), message);
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
    if let Err(e) = result {
        debug!("simulated host could not write {}: {}", path.display(), e);
    }
}

#[async_trait]
impl ServerRuntime for SimulatedHost {
    fn start_script_present(&self) -> bool {
        true
    }

    async fn launch(&self) -> ProcessResult<u32> {
        let pid = {
            let mut state = self.state.lock();
            if state.alive.is_some() {
                return Err(ProcessError::spawn_failed("a server process is already running"));
            }
            let pid = state.next_pid;
            state.next_pid += 1;
            state.alive = Some(pid);
            state.started_at = Some(Utc::now());
            state.launches += 1;
            pid
        };
        append_log(&self.log_path, "[Server thread/INFO]: Starting minecraft server version 1.21.4");
        append_log(&self.log_path, "[Server thread/INFO]: Done (3.142s)! For help, type \"help\"");
        Ok(pid)
    }

    fn matches_server(&self, pid: u32) -> bool {
        self.state.lock().alive == Some(pid)
    }

    fn find_server_pid(&self) -> Option<u32> {
        self.state.lock().alive
    }

    fn process_started_at(&self, pid: u32) -> Option<DateTime<Utc>> {
        let state = self.state.lock();
        state.started_at.filter(|_| state.alive == Some(pid))
    }

    async fn port_open(&self) -> bool {
        self.is_alive()
    }

    async fn rcon_port_open(&self) -> bool {
        self.is_alive()
    }

    fn rcon_configured(&self) -> bool {
        true
    }

    async fn rcon_command(&self, command: &str) -> RconResult<String> {
        if !self.is_alive() {
            return Err(RconError::connection(self.rcon.addr().to_string(), "connection refused"));
        }
        append_log(
            &self.log_path,
            "[RCON Listener #1/INFO]: Thread RCON Client /127.0.0.1 started",
        );
        let config = RconConfig::new("127.0.0.1", self.rcon.port(), RCON_PASSWORD).with_timeout(RCON_TIMEOUT);
        RconClient::execute_once(&config, command).await
    }

    fn signal(&self, pid: u32, signal: StopSignal) -> ProcessResult<()> {
        let mut state = self.state.lock();
        if state.alive != Some(pid) {
            return Err(ProcessError::NotFound { pid });
        }
        state.signals.push(signal);
        state.alive = None;
        drop(state);
        append_log(&self.log_path, "[Server Shutdown Thread/INFO]: Stopping server");
        Ok(())
    }
}
