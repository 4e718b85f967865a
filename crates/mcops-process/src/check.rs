//! Process existence checking and identification.
//!
//! A PID alone is not proof that the game server is running: PIDs are
//! recycled, and after a host reboot the PID in a leftover PID file may
//! belong to an unrelated process. [`ProcessInspector`] therefore also
//! reads the command line so callers can confirm the process is really
//! the server.

use chrono::{DateTime, TimeZone, Utc};
use mcops_common::{ProcessError, ProcessResult};
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessStatus, System};

/// Check if a process with the given PID exists.
///
/// Uses `kill(pid, 0)`, which delivers no signal. `EPERM` means the process
/// exists but belongs to someone else.
pub fn process_exists(pid: u32) -> ProcessResult<bool> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid as NixPid;

    match kill(NixPid::from_raw(pid as i32), None) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        Err(nix::errno::Errno::EPERM) => Ok(true),
        Err(e) => Err(ProcessError::check_failed(pid, e.to_string())),
    }
}

/// Identity of a live process as seen by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cmdline: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub memory_bytes: u64,
}

impl ProcessInfo {
    /// True when every pattern appears somewhere in the name or command
    /// line, case-insensitively. `java` alone is not enough: other JVMs run
    /// on game hosts too.
    pub fn matches_all(&self, patterns: &[String]) -> bool {
        let haystack: Vec<String> = std::iter::once(&self.name)
            .chain(self.cmdline.iter())
            .map(|s| s.to_lowercase())
            .collect();
        patterns.iter().all(|pattern| {
            let needle = pattern.to_lowercase();
            haystack.iter().any(|part| part.contains(&needle))
        })
    }
}

/// Reads process details through `sysinfo`.
pub struct ProcessInspector {
    system: Mutex<System>,
}

impl std::fmt::Debug for ProcessInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessInspector").finish()
    }
}

impl Default for ProcessInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInspector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Inspect a PID. Zombies and vanished processes return `None`.
    pub fn inspect(&self, pid: u32) -> Option<ProcessInfo> {
        let sys_pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        if !system.refresh_process(sys_pid) {
            return None;
        }
        let process = system.process(sys_pid)?;
        if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
            return None;
        }

        let started_at = Utc.timestamp_opt(process.start_time() as i64, 0).single();
        Some(ProcessInfo {
            pid,
            name: process.name().to_string(),
            cmdline: process.cmd().to_vec(),
            started_at,
            memory_bytes: process.memory(),
        })
    }

    /// Scan the process table for the lowest PID whose command line
    /// matches every pattern. An empty pattern list never matches.
    pub fn find_matching(&self, patterns: &[String]) -> Option<ProcessInfo> {
        if patterns.is_empty() {
            return None;
        }
        let own_pid = std::process::id();
        let mut system = self.system.lock();
        system.refresh_processes();

        system
            .processes()
            .iter()
            .filter(|(pid, process)| {
                pid.as_u32() != own_pid && !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
            })
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_string(),
                cmdline: process.cmd().to_vec(),
                started_at: Utc.timestamp_opt(process.start_time() as i64, 0).single(),
                memory_bytes: process.memory(),
            })
            .filter(|info| info.matches_all(patterns))
            .min_by_key(|info| info.pid)
    }
}
