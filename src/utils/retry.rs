//! Retry utilities for resilient operations
//!
//! This module provides the retry mechanism with exponential backoff used by
//! the ingestion stage and the notification delivery service. Operations may
//! return any error type; a predicate decides per error whether to retry and
//! may supply its own delay (e.g. a server-provided `Retry-After`).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth and delay hints)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with custom delays
    pub fn with_delays(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier: 2.0,
        }
    }

    /// Calculate delay for a given attempt using exponential backoff
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = if attempt == 0 {
            0
        } else {
            let exponential = self.base_delay_ms as f64
                * self
                    .backoff_multiplier
                    .powi(i32::try_from(attempt - 1).unwrap_or(i32::MAX));
            if exponential.is_finite() {
                (exponential as u64).min(self.max_delay_ms)
            } else {
                self.max_delay_ms
            }
        };

        Duration::from_millis(delay_ms)
    }

    /// Delay before retry `attempt`, preferring a capped hint over backoff
    fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) => hint.min(Duration::from_millis(self.max_delay_ms)),
            None => self.calculate_delay(attempt),
        }
    }
}

/// Verdict of a retry predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry, optionally after the given delay instead of the backoff delay
    Retry(Option<Duration>),

    /// Give up and return the error
    Abort,
}

/// Execute an operation with retry logic, using a custom retry predicate
///
/// The predicate is consulted for each error: [`RetryDecision::Abort`]
/// returns the error immediately, [`RetryDecision::Retry`] waits (the hinted
/// delay capped at `max_delay_ms`, or the backoff delay) and tries again.
/// Once `max_retries` retries are used up the last error is returned.
///
/// # Example
///
/// ```no_run
/// use legiswatch::utils::retry::{with_retry_if, RetryConfig, RetryDecision};
///
/// async fn fetch_data() -> Result<String, std::io::Error> {
///     Ok("data".to_string())
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), std::io::Error> {
///     let config = RetryConfig::default();
///     let data = with_retry_if(&config, fetch_data, |e: &std::io::Error| {
///         match e.kind() {
///             std::io::ErrorKind::InvalidData => RetryDecision::Abort,
///             _ => RetryDecision::Retry(None),
///         }
///     })
///     .await?;
///     Ok(())
/// }
/// ```
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation: F,
    decide: P,
) -> Result<T, E>
where
    E: Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> RetryDecision,
{
    let mut attempt = 0;

    loop {
        let error = match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        let hint = match decide(&error) {
            RetryDecision::Abort => {
                warn!(error = %error, "Non-retryable error encountered");
                return Err(error);
            }
            RetryDecision::Retry(hint) => hint,
        };

        if attempt >= config.max_retries {
            warn!(
                attempts = attempt + 1,
                error = %error,
                "Retries exhausted"
            );
            return Err(error);
        }

        attempt += 1;
        let delay = config.delay_for(attempt, hint);
        warn!(
            attempt = attempt,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Operation failed, will retry"
        );
        tokio::time::sleep(delay).await;
    }
}
