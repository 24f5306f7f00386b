//! A dataset persisted as one JSON document on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{Dataset, Error};

#[derive(Debug, Clone)]
pub struct DatasetFile {
    path: PathBuf,
}

impl DatasetFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored dataset. A file that doesn't exist yet is an empty dataset.
    pub fn load(&self) -> Result<Dataset, Error> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!(
                    "No dataset at {}, starting from an empty one",
                    self.path.display()
                );
                return Ok(Dataset::default());
            }
            Err(source) => {
                return Err(Error::Storage {
                    action: "read",
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| Error::CorruptStore {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the stored dataset. The new document is written next to the old one and renamed over
    /// it, so a crash mid-write leaves the previous version intact.
    pub fn save(&self, dataset: &Dataset) -> Result<(), Error> {
        let bytes = serde_json::to_vec(dataset).map_err(Error::Encode)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| Error::Storage {
                action: "create directory for",
                path: self.path.clone(),
                source,
            })?;
        }

        let staging = self.staging_path();
        std::fs::write(&staging, &bytes).map_err(|source| Error::Storage {
            action: "write",
            path: staging.clone(),
            source,
        })?;
        std::fs::rename(&staging, &self.path).map_err(|source| Error::Storage {
            action: "replace",
            path: self.path.clone(),
            source,
        })?;

        log::debug!("Saved {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "dataset.json".into());
        name.push(".partial");
        self.path.with_file_name(name)
    }
}
