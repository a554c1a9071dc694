//! Delivery service: bounded retries in front of a dispatcher, outbox behind it

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::channels::{ChannelResult, NotificationDispatcher};
use super::outbox::Outbox;
use crate::error::LegiswatchErrorTrait;
use crate::metrics;
use crate::report::Report;
use crate::utils::retry::{with_retry_if, RetryConfig, RetryDecision};

/// How a report left the delivery service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Outboxed { path: PathBuf, attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Delivers reports through a dispatcher, falling back to the outbox
pub struct DeliveryService {
    dispatcher: Arc<dyn NotificationDispatcher>,
    recipients: BTreeSet<String>,
    retry: RetryConfig,
    outbox: Outbox,
}

impl DeliveryService {
    /// Create a delivery service making at most `max_attempts` tries per report
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        recipients: BTreeSet<String>,
        max_attempts: u32,
        outbox: Outbox,
    ) -> Self {
        Self {
            dispatcher,
            recipients,
            retry: RetryConfig::with_delays(max_attempts.saturating_sub(1), 500, 10_000),
            outbox,
        }
    }

    /// Override the retry delays
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn dispatcher_name(&self) -> &str {
        self.dispatcher.name()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Deliver a report, moving it to the outbox when every attempt fails
    ///
    /// Only an outbox write failure is returned as an error.
    pub async fn deliver(&self, report: &Report) -> ChannelResult<DeliveryOutcome> {
        let attempts = AtomicU32::new(0);

        let result = with_retry_if(
            &self.retry,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                self.dispatcher.deliver(report, &self.recipients)
            },
            |e| {
                if e.is_recoverable() {
                    RetryDecision::Retry(None)
                } else {
                    RetryDecision::Abort
                }
            },
        )
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        match result {
            Ok(()) => {
                tracing::info!(
                    report = %report.id,
                    channel = self.dispatcher.name(),
                    attempts = attempts,
                    "Report delivered"
                );
                Ok(DeliveryOutcome::Delivered { attempts })
            }
            Err(e) => {
                metrics::record_delivery_failure(self.dispatcher.name());
                tracing::error!(
                    report = %report.id,
                    channel = self.dispatcher.name(),
                    attempts = attempts,
                    error = %e,
                    "Report delivery failed"
                );
                let path = self
                    .outbox
                    .store(report, &self.recipients, attempts, &e.to_string())?;
                Ok(DeliveryOutcome::Outboxed { path, attempts })
            }
        }
    }
}
