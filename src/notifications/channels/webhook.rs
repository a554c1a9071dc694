//! Webhook delivery channel
//!
//! Reports are posted as JSON to a single endpoint:
//!
//! ```json
//! {
//!   "report": { "id": "daily-2024-03-01", "kind": "daily", "rankings": [...] },
//!   "recipients": ["team@example.eu"],
//!   "summary": "daily report 2024-03-01: 3 keywords, top: bitcoin (12), 0 highlights"
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeSet;
use std::time::Duration;
use url::Url;

use super::{ChannelResult, DeliveryError, NotificationDispatcher};
use crate::report::Report;
use crate::utils::truncate_text;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Where and how to post reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,

    /// Sent as a bearer token when set
    pub auth_token: Option<String>,

    pub timeout_secs: u64,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Parse the endpoint, accepting only http(s) URLs
    pub fn endpoint(&self) -> Result<Url, DeliveryError> {
        let url = Url::parse(&self.url)
            .map_err(|e| DeliveryError::InvalidConfig(format!("webhook URL '{}': {e}", self.url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(DeliveryError::InvalidConfig(format!(
                "webhook URL scheme '{other}' is not http(s)"
            ))),
        }
    }
}

/// Posts each report to a webhook
///
/// One request per call; retries belong to the delivery service.
pub struct WebhookDispatcher {
    endpoint: Url,
    auth_token: Option<String>,
    client: Client,
}

impl WebhookDispatcher {
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        let endpoint = config.endpoint()?;
        if config.timeout_secs == 0 {
            return Err(DeliveryError::InvalidConfig(
                "webhook timeout must be greater than 0".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoint,
            auth_token: config.auth_token,
            client,
        })
    }

    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    pub fn url(&self) -> &str {
        self.endpoint.as_str()
    }

    fn payload(report: &Report, recipients: &BTreeSet<String>) -> serde_json::Value {
        serde_json::json!({
            "report": report,
            "recipients": recipients,
            "summary": report.summary(),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, report: &Report, recipients: &BTreeSet<String>) -> ChannelResult<()> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&Self::payload(report, recipients));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: truncate_text(&body, 200),
            });
        }

        tracing::info!(
            url = %self.endpoint,
            report = %report.id,
            status = status.as_u16(),
            "Webhook delivered"
        );
        Ok(())
    }
}
