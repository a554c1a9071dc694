//! Document ingestion
//!
//! The orchestrator depends only on the [`IngestionAdapter`] capability; the
//! HTTP implementation for the open-data API lives in [`http`].

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::error::{ErrorCategory, LegiswatchErrorTrait};
use crate::models::Document;

pub use http::{HttpAdapterConfig, HttpIngestionAdapter};

/// Errors returned by ingestion adapters
#[derive(Debug, Error)]
pub enum IngestError {
    /// Connection, timeout or upstream server failure
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream asked us to slow down
    #[error("Rate limited{}", retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// Upstream answered with something we cannot use
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl IngestError {
    /// Transient errors are retried with backoff; others abort the run
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }

    /// Server-provided delay before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl LegiswatchErrorTrait for IngestError {
    fn is_recoverable(&self) -> bool {
        self.is_transient()
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) | Self::RateLimited { .. } => ErrorCategory::Network,
            Self::Protocol(_) => ErrorCategory::Protocol,
        }
    }
}

/// Source of legislative documents
#[async_trait]
pub trait IngestionAdapter: Send + Sync {
    /// Adapter name used in logs
    fn name(&self) -> &str;

    /// Fetch documents published or updated since `since`
    async fn fetch(&self, since: DateTime<Utc>) -> Result<Vec<Document>, IngestError>;
}
