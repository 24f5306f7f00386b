//! The single source of truth. Every device's dataset is merged into it, one at a time.

use std::sync::Arc;

use reconcile::storage::DatasetFile;
use reconcile::{Dataset, merge_dataset};
use tokio::sync::{Mutex, broadcast};

use crate::error::AppError;

pub struct Authority {
    // Held across load-merge-store, so reconciles never interleave.
    stored: Mutex<Arc<Dataset>>,
    file: DatasetFile,
    updates: broadcast::Sender<Arc<Dataset>>,
}

impl Authority {
    /// Load whatever is on disk and start serving it.
    pub fn open(file: DatasetFile, broadcast_capacity: usize) -> Result<Self, reconcile::Error> {
        let stored = file.load().inspect_err(|e| {
            log::error!("Failed to load stored dataset: {e}");
        })?;
        log::info!(
            "Loaded dataset from {} ({} projects)",
            file.path().display(),
            stored.projects.len()
        );
        Ok(Self::new(file, stored, broadcast_capacity))
    }

    pub fn new(file: DatasetFile, stored: Dataset, broadcast_capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(broadcast_capacity);
        Self {
            stored: Mutex::new(Arc::new(stored)),
            file,
            updates,
        }
    }

    pub async fn current(&self) -> Arc<Dataset> {
        Arc::clone(&*self.stored.lock().await)
    }

    /// Merge a device's dataset into the stored one, persist the result, tell every subscriber, and
    /// return it.
    ///
    /// If persisting fails the merged dataset still replaces the in-memory copy (it stays authoritative
    /// for this process) but the caller gets the error and nothing is broadcast.
    pub async fn reconcile(&self, incoming: Dataset) -> Result<Arc<Dataset>, AppError> {
        let mut stored = self.stored.lock().await;

        let merged = Arc::new(merge_dataset(&stored, &incoming));
        *stored = Arc::clone(&merged);

        let file = self.file.clone();
        let to_save = Arc::clone(&merged);
        tokio::task::spawn_blocking(move || file.save(&to_save))
            .await?
            .map_err(AppError::SaveFailed)?;

        // Sent while still holding the lock so subscribers see datasets in reconcile order.
        // `send` only fails when nobody is subscribed.
        let listeners = self.updates.send(Arc::clone(&merged)).unwrap_or(0);
        log::info!(
            "Reconciled dataset ({} projects), pushed to {listeners} subscriber(s)",
            merged.projects.len()
        );

        Ok(merged)
    }

    /// Start listening for changes. The current dataset is returned alongside the receiver so the
    /// subscriber has state right away; taking both under the lock means no update can slip between them.
    pub async fn subscribe(&self) -> (Arc<Dataset>, broadcast::Receiver<Arc<Dataset>>) {
        let stored = self.stored.lock().await;
        (Arc::clone(&stored), self.updates.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }
}
