//! Remote backup storage.
//!
//! The backup scheduler only sees [`RemoteStorage`]. [`DirectoryStorage`]
//! copies archives into a folder of a mounted remote drive; access is
//! granted through a service-account credentials file which is validated
//! when the storage is opened.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mcops_common::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PARTIAL_SUFFIX: &str = ".partial";

/// One stored backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Human-readable target, for logs.
    fn describe(&self) -> String;

    async fn upload(&self, folder: &str, local_path: &Path, name: &str) -> SchedulerResult<RemoteObject>;

    async fn list(&self, folder: &str) -> SchedulerResult<Vec<RemoteObject>>;

    async fn delete(&self, folder: &str, id: &str) -> SchedulerResult<()>;
}

/// Service-account credentials JSON. Only the fields checked here are
/// modelled; everything else in the file is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceAccount {
    #[serde(rename = "type", default)]
    pub account_type: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccount {
    pub async fn load(path: &Path) -> SchedulerResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SchedulerError::Storage(format!("credentials file {}: {}", path.display(), e))
        })?;
        let account: ServiceAccount = serde_json::from_str(&content).map_err(|e| {
            SchedulerError::Storage(format!("credentials file {}: {}", path.display(), e))
        })?;
        account.validate()?;
        Ok(account)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.account_type != "service_account" {
            return Err(SchedulerError::Storage(format!(
                "credentials type is '{}', expected 'service_account'",
                self.account_type
            )));
        }
        if self.client_email.trim().is_empty() {
            return Err(SchedulerError::Storage("credentials have no client_email".to_string()));
        }
        Ok(())
    }
}

/// Folder names and object ids are single path components.
fn check_component(kind: &str, value: &str) -> SchedulerResult<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\');
    if bad {
        return Err(SchedulerError::Storage(format!("invalid {} '{}'", kind, value)));
    }
    Ok(())
}

/// Backups as plain files under `root/<folder>/`.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
    account: ServiceAccount,
}

impl DirectoryStorage {
    pub async fn open(root: impl Into<PathBuf>, credentials_path: &Path) -> SchedulerResult<Self> {
        let root = root.into();
        let account = ServiceAccount::load(credentials_path).await?;
        tokio::fs::create_dir_all(&root).await?;
        info!("☁️  Backup storage at {} as {}", root.display(), account.client_email);
        Ok(Self { root, account })
    }

    pub fn account(&self) -> &ServiceAccount {
        &self.account
    }

    fn folder_path(&self, folder: &str) -> SchedulerResult<PathBuf> {
        check_component("folder", folder)?;
        Ok(self.root.join(folder))
    }
}

#[async_trait]
impl RemoteStorage for DirectoryStorage {
    fn describe(&self) -> String {
        format!("{} ({})", self.root.display(), self.account.client_email)
    }

    async fn upload(&self, folder: &str, local_path: &Path, name: &str) -> SchedulerResult<RemoteObject> {
        check_component("name", name)?;
        let dir = self.folder_path(folder)?;
        tokio::fs::create_dir_all(&dir).await?;

        let target = dir.join(name);
        let partial = dir.join(format!("{}{}", name, PARTIAL_SUFFIX));
        let size_bytes = tokio::fs::copy(local_path, &partial)
            .await
            .map_err(|e| SchedulerError::Upload(format!("{}: {}", local_path.display(), e)))?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| SchedulerError::Upload(format!("{}: {}", target.display(), e)))?;

        debug!("Uploaded {} ({} bytes)", target.display(), size_bytes);
        Ok(RemoteObject {
            id: name.to_string(),
            name: name.to_string(),
            size_bytes,
            created_at: Utc::now(),
        })
    }

    async fn list(&self, folder: &str) -> SchedulerResult<Vec<RemoteObject>> {
        let dir = self.folder_path(folder)?;
        let mut objects = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(objects),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let created_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            objects.push(RemoteObject {
                id: name.clone(),
                name,
                size_bytes: metadata.len(),
                created_at,
            });
        }
        Ok(objects)
    }

    async fn delete(&self, folder: &str, id: &str) -> SchedulerResult<()> {
        check_component("object id", id)?;
        let path = self.folder_path(folder)?.join(id);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| SchedulerError::Storage(format!("delete {}: {}", path.display(), e)))
    }
}

/// Delete all but the newest `keep` objects in `folder`. Individual delete
/// failures are logged and skipped. Returns how many were deleted.
pub async fn prune(storage: &dyn RemoteStorage, folder: &str, keep: usize) -> SchedulerResult<usize> {
    let mut objects = storage.list(folder).await?;
    if objects.len() <= keep {
        return Ok(0);
    }

    objects.sort_by_key(|o| o.created_at);
    let excess = objects.len() - keep;
    let mut deleted = 0;
    for object in objects.into_iter().take(excess) {
        match storage.delete(folder, &object.id).await {
            Ok(()) => {
                info!("🗑️  Pruned old backup {}", object.name);
                deleted += 1;
            }
            Err(e) => warn!("Failed to prune {}: {}", object.name, e),
        }
    }
    Ok(deleted)
}
