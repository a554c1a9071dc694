//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use legiswatch::ingest::{IngestError, IngestionAdapter};
use legiswatch::matcher::{KeywordSet, MatchOptions};
use legiswatch::models::Document;
use legiswatch::notifications::{ChannelResult, NotificationDispatcher};
use legiswatch::report::Report;

pub type FetchResponse = Result<Vec<Document>, IngestError>;

/// Parse an RFC 3339 timestamp
pub fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .unwrap()
        .with_timezone(&Utc)
}

/// Create a test document with an empty title
pub fn document(id: &str, body: &str) -> Document {
    Document::new(id, "", body)
}

/// Case-insensitive, whole-word keyword set
pub fn keywords(words: &[&str]) -> KeywordSet {
    let options = MatchOptions {
        whole_word: true,
        ..Default::default()
    };
    KeywordSet::new(words.iter().copied(), &options).unwrap()
}

/// Adapter replaying scripted responses, then returning empty batches
#[derive(Default)]
pub struct ScriptedAdapter {
    responses: Mutex<VecDeque<FetchResponse>>,
    since: Mutex<Vec<DateTime<Utc>>>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(responses: Vec<FetchResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        })
    }

    pub fn push(&self, response: FetchResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `since` arguments received, in call order
    pub fn since_values(&self) -> Vec<DateTime<Utc>> {
        self.since.lock().unwrap().clone()
    }
}

#[async_trait]
impl IngestionAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, since: DateTime<Utc>) -> Result<Vec<Document>, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.since.lock().unwrap().push(since);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Dispatcher keeping every delivered report
#[derive(Default)]
pub struct RecordingDispatcher {
    delivered: Mutex<Vec<Report>>,
}

impl RecordingDispatcher {
    pub fn reports(&self) -> Vec<Report> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, report: &Report, _recipients: &BTreeSet<String>) -> ChannelResult<()> {
        self.delivered.lock().unwrap().push(report.clone());
        Ok(())
    }
}
