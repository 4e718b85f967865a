//! Signal delivery to the server process.

use mcops_common::{ProcessError, ProcessResult};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM, lets the JVM run its shutdown hooks.
    Terminate,
    /// SIGKILL.
    Kill,
}

impl StopSignal {
    fn as_nix(self) -> Signal {
        match self {
            Self::Terminate => Signal::SIGTERM,
            Self::Kill => Signal::SIGKILL,
        }
    }
}

/// Send `signal` to `pid`. A process that is already gone reports
/// [`ProcessError::NotFound`].
pub fn send_signal(pid: u32, signal: StopSignal) -> ProcessResult<()> {
    debug!("Sending {:?} to PID {}", signal, pid);
    match kill(Pid::from_raw(pid as i32), signal.as_nix()) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => Err(ProcessError::not_found(pid)),
        Err(e) => Err(ProcessError::stop_failed(pid, e.to_string())),
    }
}

pub fn terminate_gracefully(pid: u32) -> ProcessResult<()> {
    send_signal(pid, StopSignal::Terminate)
}

pub fn force_kill(pid: u32) -> ProcessResult<()> {
    send_signal(pid, StopSignal::Kill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::process_exists;
    use std::time::Duration;

    #[tokio::test]
    async fn test_terminate_child() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        terminate_gracefully(pid).unwrap();
        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();

        assert!(!status.success());
        assert!(!process_exists(pid).unwrap());
    }

    #[tokio::test]
    async fn test_signal_to_reaped_process_is_not_found() {
        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        let err = force_kill(pid).unwrap_err();
        assert!(matches!(err, ProcessError::NotFound { .. }));
    }
}
