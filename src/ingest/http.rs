//! HTTP ingestion adapter for the parliament open-data API
//!
//! Requests `GET {base}{endpoint}?since=<rfc3339>&limit=N&offset=M&format=json`
//! and accepts either a bare JSON array of documents or an object wrapping the
//! array in `data`. Field names vary between API versions, so each document
//! field is looked up under a list of aliases.
//!
//! Pages are requested until one comes back shorter than `limit`. A window
//! that needs more than `max_pages` pages fails the fetch rather than
//! returning part of it.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use super::{IngestError, IngestionAdapter};
use crate::models::Document;
use crate::utils::truncate_text;

const ID_FIELDS: &[&str] = &["id", "identifier"];
const TITLE_FIELDS: &[&str] = &["title", "label"];
const BODY_FIELDS: &[&str] = &["body", "content", "text", "description", "summary"];
const DATE_FIELDS: &[&str] = &["published_at", "date"];
const URL_FIELDS: &[&str] = &["source_url", "url"];

/// Settings for [`HttpIngestionAdapter`]
#[derive(Debug, Clone)]
pub struct HttpAdapterConfig {
    pub base_url: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub page_limit: u32,
    pub max_pages: u32,
}

impl Default for HttpAdapterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://data.europarl.europa.eu/api/v2".to_string(),
            endpoint: "/plenary-documents".to_string(),
            timeout: Duration::from_secs(30),
            page_limit: 100,
            max_pages: 50,
        }
    }
}

/// Ingestion adapter backed by a JSON HTTP API
pub struct HttpIngestionAdapter {
    client: Client,
    url: Url,
    page_limit: u32,
    max_pages: u32,
}

impl HttpIngestionAdapter {
    /// Create an adapter with its own HTTP client
    pub fn new(config: HttpAdapterConfig) -> Result<Self, IngestError> {
        let joined = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.endpoint.trim_start_matches('/')
        );
        let url = Url::parse(&joined)
            .map_err(|e| IngestError::Protocol(format!("Invalid endpoint URL '{joined}': {e}")))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .map_err(|e| IngestError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            page_limit: config.page_limit.max(1),
            max_pages: config.max_pages.max(1),
        })
    }

    /// Endpoint the adapter queries
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl IngestionAdapter for HttpIngestionAdapter {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, since: DateTime<Utc>) -> Result<Vec<Document>, IngestError> {
        let limit = self.page_limit as usize;
        let mut documents = Vec::new();
        let mut ids = HashSet::new();

        for page in 0..self.max_pages {
            let offset = u64::from(page) * u64::from(self.page_limit);
            let batch = self.fetch_page(since, offset).await?;
            let full = batch.len() >= limit;

            let before = documents.len();
            documents.extend(batch.into_iter().filter(|doc| ids.insert(doc.id.clone())));

            if !full {
                tracing::info!(
                    url = %self.url,
                    pages = page + 1,
                    count = documents.len(),
                    "Fetched documents"
                );
                return Ok(documents);
            }
            if documents.len() == before {
                return Err(IngestError::Protocol(format!(
                    "Page at offset {offset} repeats earlier documents; pagination is not honoured"
                )));
            }
        }

        Err(IngestError::Protocol(format!(
            "More than {} pages of {} documents since {since}",
            self.max_pages, self.page_limit
        )))
    }
}

impl HttpIngestionAdapter {
    async fn fetch_page(&self, since: DateTime<Utc>, offset: u64) -> Result<Vec<Document>, IngestError> {
        tracing::debug!(url = %self.url, since = %since, offset, "Fetching documents");

        let response = self
            .client
            .get(self.url.clone())
            .query(&[
                ("since", since.to_rfc3339()),
                ("limit", self.page_limit.to_string()),
                ("offset", offset.to_string()),
                ("format", "json".to_string()),
            ])
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| IngestError::Network(format!("Failed to read response body: {e}")))?;

        parse_documents(&body, Utc::now())
    }
}

fn classify_transport_error(error: reqwest::Error) -> IngestError {
    if error.is_decode() || error.is_builder() {
        IngestError::Protocol(error.to_string())
    } else {
        IngestError::Network(error.to_string())
    }
}

fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> IngestError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        IngestError::RateLimited { retry_after }
    } else if status.is_server_error() {
        IngestError::Network(format!("HTTP {status}"))
    } else {
        IngestError::Protocol(format!("HTTP {status}: {}", truncate_text(body, 200)))
    }
}

/// Parse an API response body into documents stamped with `fetched_at`
pub fn parse_documents(body: &str, fetched_at: DateTime<Utc>) -> Result<Vec<Document>, IngestError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| IngestError::Protocol(format!("Invalid JSON response: {e}")))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(IngestError::Protocol(
                    "Response object has no 'data' array".to_string(),
                ))
            }
        },
        _ => {
            return Err(IngestError::Protocol(
                "Response is neither an array nor an object".to_string(),
            ))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let obj = item.as_object().ok_or_else(|| {
                IngestError::Protocol(format!("Document at index {index} is not an object"))
            })?;
            parse_document(obj, fetched_at)
                .ok_or_else(|| IngestError::Protocol(format!("Document at index {index} has no id")))
        })
        .collect()
}

fn parse_document(obj: &Map<String, Value>, fetched_at: DateTime<Utc>) -> Option<Document> {
    let id = field(obj, ID_FIELDS)?;
    let title = field(obj, TITLE_FIELDS).unwrap_or_default();
    let body = field(obj, BODY_FIELDS).unwrap_or_default();

    let mut document = Document::new(id, title, body).with_fetched_at(fetched_at);
    if let Some(published_at) = field(obj, DATE_FIELDS).and_then(|s| parse_timestamp(&s)) {
        document = document.with_published_at(published_at);
    }
    if let Some(url) = field(obj, URL_FIELDS) {
        document = document.with_source_url(url);
    }
    Some(document)
}

/// First non-empty string (or number) value under any of `names`
fn field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match obj.get(*name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
