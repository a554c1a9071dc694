//! JSON file state store
//!
//! The whole snapshot is serialized to one file and replaced with a
//! temp-file-and-rename on every commit.

use std::path::{Path, PathBuf};

use super::{PipelineSnapshot, StateStore, StorageError};
use crate::utils::write_atomic;

/// State store backed by a single JSON document
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateStore {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load(&self) -> Result<PipelineSnapshot, StorageError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No state file, starting empty");
            return Ok(PipelineSnapshot::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|e| {
            StorageError::Corrupt(format!("{}: {e}", self.path.display()))
        })
    }

    fn commit(&self, snapshot: &PipelineSnapshot) -> Result<(), StorageError> {
        let content = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path, &content).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!(
            path = %self.path.display(),
            seen = snapshot.seen.len(),
            days = snapshot.series.len(),
            "Committed state file"
        );
        Ok(())
    }
}
