//! Notification channels for delivering reports
//!
//! This module provides the dispatcher capability the pipeline hands reports
//! to, with a webhook channel and a log-only channel.

pub mod log;
pub mod webhook;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::{ErrorCategory, LegiswatchErrorTrait};
use crate::report::Report;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, DeliveryError>;

/// Errors that can occur while delivering a report
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("Endpoint rejected notification: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Invalid channel configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Channel temporarily unavailable
    #[error("Channel temporarily unavailable: {0}")]
    Unavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Outbox could not be read or written
    #[error("Outbox I/O error at {}: {source}", path.display())]
    Outbox {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LegiswatchErrorTrait for DeliveryError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Unavailable(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidConfig(_) | Self::Serialization(_) | Self::Outbox { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Outbox { .. } => ErrorCategory::Storage,
            _ => ErrorCategory::Delivery,
        }
    }
}

/// Trait for notification dispatchers
///
/// Implement this trait to deliver reports through a custom channel.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &str;

    /// Deliver a report to the given recipients
    async fn deliver(&self, report: &Report, recipients: &BTreeSet<String>) -> ChannelResult<()>;
}
