//! Unified error handling for the legiswatch crate
//!
//! Each component owns a domain-specific error enum; this module wraps them
//! in a single [`Error`] so the orchestrator and the binary can propagate
//! failures across component boundaries with `?`.
//!
//! # Architecture
//!
//! - [`LegiswatchErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

pub use crate::analytics::aggregation::AggregationError;
pub use crate::config::ConfigError;
pub use crate::ingest::IngestError;
pub use crate::matcher::MatchConfigError;
pub use crate::notifications::DeliveryError;
pub use crate::storage::StorageError;

/// Common trait for all legiswatch error types
pub trait LegiswatchErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Malformed upstream data
    Protocol,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Time-series bookkeeping errors
    Aggregation,
    /// Report delivery errors
    Delivery,
    /// Run interrupted by shutdown
    Cancelled,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Protocol => "protocol",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Aggregation => "aggregation",
            Self::Delivery => "delivery",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the legiswatch crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Keyword set errors, raised at load time
    #[error("Keyword configuration error: {0}")]
    Match(#[from] MatchConfigError),

    /// Ingestion adapter errors
    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    /// Aggregation engine errors
    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    /// Persisted state errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Notification delivery errors
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Run cancelled between stages
    #[error("Run cancelled before stage '{stage}'")]
    Cancelled { stage: &'static str },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LegiswatchErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(e) => e.is_recoverable(),
            Self::Match(e) => e.is_recoverable(),
            Self::Ingest(e) => e.is_recoverable(),
            Self::Aggregation(e) => e.is_recoverable(),
            Self::Storage(e) => e.is_recoverable(),
            Self::Delivery(e) => e.is_recoverable(),
            Self::Cancelled { .. } => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Match(e) => e.category(),
            Self::Ingest(e) => e.category(),
            Self::Aggregation(e) => e.category(),
            Self::Storage(e) => e.category(),
            Self::Delivery(e) => e.category(),
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Protocol,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
