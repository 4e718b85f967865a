//! Console history kept across daemon restarts, one JSON entry per line.

use crate::types::ConsoleEntry;
use mcops_common::Result;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub async fn save_history(path: &Path, entries: &[ConsoleEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut content = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut content, entry)?;
        content.push(b'\n');
    }
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(&content).await?;
    file.flush().await?;
    info!("Saved {} console entries to {}", entries.len(), path.display());
    Ok(())
}

/// Missing file is an empty history. Lines that do not parse are skipped.
pub async fn load_history(path: &Path) -> Result<Vec<ConsoleEntry>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut entries = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => debug!("Skipping console history line: {}", e),
        }
    }
    Ok(entries)
}
