//! Storage boundary for temporary locations
//!
//! The session only needs to create, probe, and recursively delete the
//! folders that hold its temporary tables.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use tessera_core::{storage_error, StoragePath, TesseraResult};
use tracing::{debug, warn};

/// Permissions and lifetime rules applied to created locations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStrategy {
    pub folder_permission: u32,
    /// Remove the outermost created folder when the storage handle goes away
    pub delete_on_exit: bool,
}

impl StorageStrategy {
    /// Owner-only access, removed at the latest when the storage handle is dropped
    pub const TEMPORARY: StorageStrategy = StorageStrategy {
        folder_permission: 0o700,
        delete_on_exit: true,
    };

    pub const PERSISTENT: StorageStrategy = StorageStrategy {
        folder_permission: 0o775,
        delete_on_exit: false,
    };
}

#[async_trait]
pub trait TemporaryStorage: Send + Sync {
    /// Identifier of the backing file system, used in log messages
    fn uri(&self) -> String;

    async fn exists(&self, path: &StoragePath) -> TesseraResult<bool>;

    /// Create `path` and any missing parents, applying `strategy` to the
    /// folders that did not exist before
    async fn create(&self, path: &StoragePath, strategy: &StorageStrategy) -> TesseraResult<()>;

    /// Returns whether anything was deleted
    async fn delete(&self, path: &StoragePath, recursive: bool) -> TesseraResult<bool>;
}

/// Local file system storage
///
/// Folders created with a `delete_on_exit` strategy that are still present
/// when the handle is dropped get removed then.
#[derive(Debug, Default)]
pub struct LocalStorage {
    delete_on_exit: Mutex<HashSet<PathBuf>>,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folders scheduled for removal on drop
    pub fn pending_deletions(&self) -> Vec<PathBuf> {
        let pending = self.delete_on_exit.lock().unwrap_or_else(|e| e.into_inner());
        pending.iter().cloned().collect()
    }

    fn to_local(path: &StoragePath) -> TesseraResult<PathBuf> {
        if path.scheme != "file" {
            return Err(storage_error!(
                format!("Local storage cannot handle scheme '{}'", path.scheme),
                "local_storage"
            ));
        }
        Ok(PathBuf::from(path.path()))
    }

    #[cfg(unix)]
    async fn apply_permission(path: &std::path::Path, mode: u32) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
    }

    #[cfg(not(unix))]
    async fn apply_permission(_path: &std::path::Path, _mode: u32) -> std::io::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TemporaryStorage for LocalStorage {
    fn uri(&self) -> String {
        "file:///".to_string()
    }

    async fn exists(&self, path: &StoragePath) -> TesseraResult<bool> {
        let local = Self::to_local(path)?;
        Ok(tokio::fs::try_exists(&local).await?)
    }

    async fn create(&self, path: &StoragePath, strategy: &StorageStrategy) -> TesseraResult<()> {
        // Find the folders that are about to be created so only those get the strategy
        let mut missing = Vec::new();
        let mut current = Some(path.clone());
        while let Some(candidate) = current {
            if self.exists(&candidate).await? {
                break;
            }
            current = candidate.parent();
            missing.push(candidate);
        }

        let local = Self::to_local(path)?;
        tokio::fs::create_dir_all(&local).await.map_err(|e| {
            storage_error!(format!("Failed to create {}", path), "local_storage", e)
        })?;

        for created in missing.iter().rev() {
            let created_local = Self::to_local(created)?;
            Self::apply_permission(&created_local, strategy.folder_permission)
                .await
                .map_err(|e| {
                    storage_error!(
                        format!("Failed to apply permissions to {}", created),
                        "local_storage",
                        e
                    )
                })?;
        }

        if strategy.delete_on_exit {
            if let Some(outermost) = missing.last() {
                let outermost = Self::to_local(outermost)?;
                let mut pending = self.delete_on_exit.lock().unwrap_or_else(|e| e.into_inner());
                pending.insert(outermost);
            }
        }

        debug!(path = %path, created = missing.len(), "Created local location");
        Ok(())
    }

    async fn delete(&self, path: &StoragePath, recursive: bool) -> TesseraResult<bool> {
        let local = Self::to_local(path)?;
        {
            let mut pending = self.delete_on_exit.lock().unwrap_or_else(|e| e.into_inner());
            pending.retain(|scheduled| !scheduled.starts_with(&local));
        }

        let metadata = match tokio::fs::metadata(&local).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(&local).await?;
            } else {
                tokio::fs::remove_dir(&local).await?;
            }
        } else {
            tokio::fs::remove_file(&local).await?;
        }
        Ok(true)
    }
}

impl Drop for LocalStorage {
    fn drop(&mut self) {
        let pending = self.delete_on_exit.get_mut().unwrap_or_else(|e| e.into_inner());
        for path in pending.drain() {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => debug!(path = %path.display(), "Deleted folder on exit"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete folder on exit"),
            }
        }
    }
}
