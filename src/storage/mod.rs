//! Persisted pipeline state
//!
//! The seen set, the aggregate series and the fetch watermark are committed
//! together through a [`StateStore`]. A commit either lands completely or
//! leaves the previously committed snapshot untouched.

pub mod dedup;
pub mod json;
pub mod lock;
pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analytics::AggregationEngine;
use crate::error::{ErrorCategory, LegiswatchErrorTrait};

pub use dedup::{DedupCheckResult, SeenSet};
pub use json::JsonStateStore;
pub use lock::WriterLock;
pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

/// Errors raised by state stores
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt state: {0}")]
    Corrupt(String),

    #[error("State store unavailable: {0}")]
    Unavailable(String),

    #[error("State store is locked by another process ({})", path.display())]
    Locked { path: PathBuf },
}

impl LegiswatchErrorTrait for StorageError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Unavailable(_) | Self::Locked { .. })
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

/// Everything the pipeline persists between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub seen: SeenSet,
    pub series: AggregationEngine,

    /// Upper bound of the last successful fetch window
    pub last_fetch_at: Option<DateTime<Utc>>,
}

/// Durable storage for [`PipelineSnapshot`]s
pub trait StateStore: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &'static str;

    /// Load the last committed snapshot, or an empty one if nothing was committed
    fn load(&self) -> Result<PipelineSnapshot, StorageError>;

    /// Replace the committed snapshot atomically
    fn commit(&self, snapshot: &PipelineSnapshot) -> Result<(), StorageError>;
}

/// Available persistent backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Json,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown storage backend '{other}'")),
        }
    }
}

/// Open the configured state store
pub fn open_store(backend: StorageBackend, path: &Path) -> Result<Box<dyn StateStore>, StorageError> {
    tracing::debug!(backend = ?backend, path = %path.display(), "Opening state store");
    match backend {
        StorageBackend::Sqlite => Ok(Box::new(SqliteStateStore::open(path)?)),
        StorageBackend::Json => Ok(Box::new(JsonStateStore::new(path))),
    }
}
