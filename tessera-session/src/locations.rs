//! Session temporary locations
//!
//! Temporary tables of a session live under `{workspace temporary root}/{session id}`.
//! Each such location is created at most once per session. When several
//! queries race on the same location, one of them creates it and the others
//! wait until it is ready before returning.
//!
//! Cleanup waits for in-flight creations, so a location can't be created
//! behind its back. Once cleaned up, the tracker refuses new locations.

use crate::schema::WorkspaceSchema;
use crate::storage::{StorageStrategy, TemporaryStorage};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tessera_core::{ErrorContext, StoragePath, TesseraError, TesseraResult};
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn, Instrument, Span};

struct TemporaryLocation {
    storage: Arc<dyn TemporaryStorage>,
    ready: OnceCell<()>,
}

pub struct TemporaryLocationTracker {
    session_id: String,
    locations: DashMap<StoragePath, Arc<TemporaryLocation>>,
    /// `true` once cleaned up; readers are in-flight `ensure` calls
    closed: RwLock<bool>,
    span: Span,
}

impl TemporaryLocationTracker {
    pub fn new(session_id: impl Into<String>, parent: &Span) -> Self {
        let session_id = session_id.into();
        Self {
            span: tracing::debug_span!(parent: parent, "temporary_locations", session_id = %session_id),
            session_id,
            locations: DashMap::new(),
            closed: RwLock::new(false),
        }
    }

    /// Make sure this session's location under `workspace` exists.
    ///
    /// Returns the location path. Fails with `StorageProvisioning` when the
    /// location could not be created, or when the tracker was already cleaned
    /// up. A failed creation is retried by the next call.
    pub async fn ensure(&self, workspace: &dyn WorkspaceSchema) -> TesseraResult<StoragePath> {
        let path = workspace.temporary_root().join(&self.session_id);

        let closed = self.closed.read().await;
        if *closed {
            return Err(TesseraError::StorageProvisioning {
                path: path.path(),
                source: None,
                context: ErrorContext::new("temporary_locations")
                    .with_operation("ensure")
                    .with_metadata("reason", "session closed"),
            });
        }

        let location = Arc::clone(
            self.locations
                .entry(path.clone())
                .or_insert_with(|| {
                    Arc::new(TemporaryLocation {
                        storage: workspace.storage(),
                        ready: OnceCell::new(),
                    })
                })
                .value(),
        );

        location
            .ready
            .get_or_try_init(|| Self::provision(&location.storage, &path))
            .instrument(self.span.clone())
            .await?;

        drop(closed);
        Ok(path)
    }

    async fn provision(storage: &Arc<dyn TemporaryStorage>, path: &StoragePath) -> TesseraResult<()> {
        let provisioning_error = |source: Option<TesseraError>| TesseraError::StorageProvisioning {
            path: path.path(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            context: ErrorContext::new("temporary_locations")
                .with_operation("ensure")
                .with_metadata("storage", &storage.uri()),
        };

        storage
            .create(path, &StorageStrategy::TEMPORARY)
            .await
            .map_err(|e| provisioning_error(Some(e)))?;

        let exists = storage
            .exists(path)
            .await
            .map_err(|e| provisioning_error(Some(e)))?;
        if !exists {
            return Err(provisioning_error(None));
        }

        info!(path = %path.path(), storage = %storage.uri(), "Created session temporary location");
        Ok(())
    }

    /// Whether `path` was created for this session
    pub fn contains(&self, path: &StoragePath) -> bool {
        self.locations
            .get(path)
            .map(|entry| entry.value().ready.initialized())
            .unwrap_or(false)
    }

    /// Paths of the locations created so far
    pub fn paths(&self) -> Vec<StoragePath> {
        self.locations
            .iter()
            .filter(|entry| entry.value().ready.initialized())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.locations
            .iter()
            .filter(|entry| entry.value().ready.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recursively delete every created location and forget them all.
    ///
    /// Waits for creations in progress to finish first. Each deletion is
    /// attempted even if others fail; failures are only logged. Returns how
    /// many locations were deleted.
    pub async fn cleanup(&self) -> usize {
        let mut closed = self.closed.write().await;
        *closed = true;

        let keys: Vec<StoragePath> = self
            .locations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let drained: Vec<(StoragePath, Arc<TemporaryLocation>)> = keys
            .into_iter()
            .filter_map(|path| self.locations.remove(&path))
            .filter(|(_, location)| location.ready.initialized())
            .collect();

        let deletions = drained.iter().map(|(path, location)| async move {
            match location.storage.delete(path, true).await {
                Ok(deleted) => {
                    info!(
                        path = %path.path(),
                        storage = %location.storage.uri(),
                        deleted = deleted,
                        "Deleted session temporary location"
                    );
                    deleted
                }
                Err(e) => {
                    warn!(
                        path = %path.path(),
                        storage = %location.storage.uri(),
                        error = %e,
                        "Error during session temporary location deletion"
                    );
                    false
                }
            }
        });

        join_all(deletions)
            .instrument(self.span.clone())
            .await
            .into_iter()
            .filter(|deleted| *deleted)
            .count()
    }
}
