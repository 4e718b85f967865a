//! One mcops daemon per state directory.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LOCK_FILE: &str = "mcops.lock";

/// Exclusive `flock` on `mcops.lock` in the state directory. The kernel
/// drops it with the file, so a crashed daemon never leaves it behind.
#[derive(Debug)]
pub struct InstanceLock {
    _file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// `Ok(None)` when another process holds the lock.
    pub fn try_acquire(state_dir: &Path) -> Result<Option<Self>> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create state directory {}", state_dir.display()))?;
        let path = state_dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => {}
            Err(e) if e == Errno::EWOULDBLOCK => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to lock {}", path.display())),
        }

        // Holder PID, for whoever wonders who has it
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!("Holding {}", path.display());
        Ok(Some(Self { _file: file, path }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
