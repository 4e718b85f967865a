//! Launching the server start script.

use mcops_common::{ProcessError, ProcessResult};
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::info;

/// Run `sh <script>` in `working_dir`, detached from our terminal.
///
/// The child gets its own process group so a Ctrl+C aimed at the control
/// plane does not take the game server down with it, and all stdio goes to
/// `/dev/null` (the server writes its own `logs/latest.log`).
pub fn spawn_detached(script: &Path, working_dir: &Path) -> ProcessResult<Child> {
    if !script.is_file() {
        return Err(ProcessError::spawn_failed(format!(
            "start script not found: {}",
            script.display()
        )));
    }

    let mut cmd = Command::new("sh");
    cmd.arg(script)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0);

    let child = cmd
        .spawn()
        .map_err(|e| ProcessError::spawn_failed(format!("sh {}: {}", script.display(), e)))?;

    info!(
        "Launched {} (PID: {:?}) in {}",
        script.display(),
        child.id(),
        working_dir.display()
    );
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let err = spawn_detached(&dir.path().join("start.sh"), dir.path()).unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("start.sh");
        tokio::fs::write(&script, "echo started > marker.txt\n").await.unwrap();

        let mut child = spawn_detached(&script, dir.path()).unwrap();
        let status = child.wait().await.unwrap();

        assert!(status.success());
        assert!(dir.path().join("marker.txt").exists());
    }
}
