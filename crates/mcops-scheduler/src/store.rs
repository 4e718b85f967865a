//! JSON persistence for scheduler config and state.

use mcops_common::{SchedulerError, SchedulerResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load `path`. A missing file is `Ok(None)`; unreadable or malformed
/// content is an error.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> SchedulerResult<Option<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SchedulerError::state_file(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| SchedulerError::state_file(path, e))
}

/// Save `value` as pretty JSON (atomic write).
pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> SchedulerResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SchedulerError::state_file(parent, e))?;
    }

    let json = serde_json::to_string_pretty(value).map_err(|e| SchedulerError::state_file(path, e))?;

    // Write to temp file, then rename
    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, json)
        .await
        .map_err(|e| SchedulerError::state_file(&temp_path, e))?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| SchedulerError::state_file(path, e))?;
    Ok(())
}
