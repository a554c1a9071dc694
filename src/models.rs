// Core data structures shared by the pipeline stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A legislative document as returned by an ingestion adapter
///
/// Documents are transient: they live for the duration of one pipeline run
/// and only the statistics derived from them are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable, externally assigned identifier
    pub id: String,
    pub published_at: Option<DateTime<Utc>>,
    pub title: String,
    pub body: String,
    pub source_url: Option<String>,
    /// When the adapter retrieved the document
    pub fetched_at: DateTime<Utc>,
}

impl Document {
    /// Create a document with the given id and body, fetched now
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            published_at: None,
            title: title.into(),
            body: body.into(),
            source_url: None,
            fetched_at: Utc::now(),
        }
    }

    /// Set the publication timestamp
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// Set the source URL
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Set the fetch timestamp
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = fetched_at;
        self
    }
}

/// Occurrences of one keyword in one document
///
/// `occurrence_count` is always at least 1; documents without a match for a
/// keyword produce no record for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRecord {
    pub document_id: String,
    pub keyword: String,
    pub occurrence_count: u64,
}

impl MatchRecord {
    /// Create a match record, returning `None` for a zero count
    pub fn new(
        document_id: impl Into<String>,
        keyword: impl Into<String>,
        occurrence_count: u64,
    ) -> Option<Self> {
        (occurrence_count > 0).then(|| Self {
            document_id: document_id.into(),
            keyword: keyword.into(),
            occurrence_count,
        })
    }
}
