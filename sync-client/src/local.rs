use std::sync::{Arc, Mutex, PoisonError};

use reconcile::Dataset;
use reconcile::storage::DatasetFile;

use crate::error::SyncError;

/// Where a device keeps its own copy of the dataset between runs.
pub trait LocalStore: Send + 'static {
    fn load(&self) -> Result<Dataset, SyncError>;
    fn save(&self, dataset: &Dataset) -> Result<(), SyncError>;
}

impl LocalStore for DatasetFile {
    fn load(&self) -> Result<Dataset, SyncError> {
        Ok(DatasetFile::load(self)?)
    }

    fn save(&self, dataset: &Dataset) -> Result<(), SyncError> {
        Ok(DatasetFile::save(self, dataset)?)
    }
}

/// Keeps the dataset in memory only. Clones share the same dataset, so a test can hold one clone
/// and look at what the coordinator saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore(Arc<Mutex<Dataset>>);

impl MemoryStore {
    pub fn new(dataset: Dataset) -> Self {
        Self(Arc::new(Mutex::new(dataset)))
    }

    pub fn get(&self) -> Dataset {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LocalStore for MemoryStore {
    fn load(&self) -> Result<Dataset, SyncError> {
        Ok(self.get())
    }

    fn save(&self, dataset: &Dataset) -> Result<(), SyncError> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = dataset.clone();
        Ok(())
    }
}
