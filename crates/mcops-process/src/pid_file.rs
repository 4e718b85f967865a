//! The server's PID file.
//!
//! Plain text, one decimal PID and a newline. Written atomically (temp file
//! then rename) so a crash mid-write never leaves a half-written PID that
//! later parses as somebody else's process.

use mcops_common::{ProcessError, ProcessResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

/// What was found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidFileState {
    Missing,
    Present(u32),
    /// File exists but does not hold a usable PID.
    Corrupt,
}

impl PidFileState {
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Present(pid) => Some(*pid),
            _ => None,
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the PID file (atomic write).
    pub async fn write(&self, pid: u32) -> ProcessResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProcessError::pid_file(parent, format!("create directory: {}", e)))?;
        }

        let temp_path = self.path.with_extension("pid.tmp");
        tokio::fs::write(&temp_path, format!("{}\n", pid))
            .await
            .map_err(|e| ProcessError::pid_file(&temp_path, e))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| ProcessError::pid_file(&self.path, e))?;

        debug!("PID file written: {} ({})", self.path.display(), pid);
        Ok(())
    }

    pub async fn read(&self) -> ProcessResult<PidFileState> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PidFileState::Missing),
            Err(e) => return Err(ProcessError::pid_file(&self.path, e)),
        };

        match content.trim().parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(PidFileState::Present(pid)),
            _ => {
                warn!("PID file {} has invalid content: {:?}", self.path.display(), content.trim());
                Ok(PidFileState::Corrupt)
            }
        }
    }

    /// Remove the file. Returns whether a file was actually deleted.
    pub async fn remove(&self) -> ProcessResult<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("PID file removed: {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ProcessError::pid_file(&self.path, e)),
        }
    }
}
