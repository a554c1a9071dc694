//! Seen-document tracking across runs
//!
//! This module provides the deduplication store for the pipeline:
//! - First-seen timestamp per document id, never overwritten
//! - Batch filtering of fetched documents, including repeats within a batch
//! - Retention-based pruning of old entries

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::Document;

// ============================================================================
// Seen Set
// ============================================================================

/// Document ids already processed, with the time each was first seen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeenSet {
    entries: HashMap<String, DateTime<Utc>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a document id was already processed
    pub fn has_seen(&self, document_id: &str) -> bool {
        self.entries.contains_key(document_id)
    }

    /// Record a document id, keeping the original timestamp on a repeat
    ///
    /// Returns `true` if the id was not seen before.
    pub fn mark_seen(&mut self, document_id: &str, seen_at: DateTime<Utc>) -> bool {
        if self.entries.contains_key(document_id) {
            return false;
        }
        self.entries.insert(document_id.to_string(), seen_at);
        true
    }

    pub fn first_seen(&self, document_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(document_id).copied()
    }

    /// Drop entries first seen before `now - retention`, returning how many were removed
    pub fn prune(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let cutoff = now - retention;
        let before = self.entries.len();
        self.entries.retain(|_, first_seen| *first_seen >= cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.entries.iter().map(|(id, ts)| (id.as_str(), *ts))
    }

    /// Split a fetched batch into new documents and a duplicate count
    ///
    /// A document is a duplicate if it was seen in an earlier run or appears
    /// earlier in the same batch. The seen set itself is not modified.
    pub fn filter_new(&self, documents: Vec<Document>) -> DedupCheckResult {
        let total_checked = documents.len();
        let mut batch_ids = HashSet::new();

        let new_documents: Vec<Document> = documents
            .into_iter()
            .filter(|doc| !self.has_seen(&doc.id) && batch_ids.insert(doc.id.clone()))
            .collect();

        DedupCheckResult {
            duplicates: total_checked - new_documents.len(),
            new_documents,
            total_checked,
        }
    }
}

impl FromIterator<(String, DateTime<Utc>)> for SeenSet {
    fn from_iter<I: IntoIterator<Item = (String, DateTime<Utc>)>>(iter: I) -> Self {
        let mut seen = Self::new();
        for (id, ts) in iter {
            seen.mark_seen(&id, ts);
        }
        seen
    }
}

// ============================================================================
// Deduplication Check Results
// ============================================================================

/// Result of filtering a fetched batch
#[derive(Debug, Clone)]
pub struct DedupCheckResult {
    /// Documents not processed before, in fetch order
    pub new_documents: Vec<Document>,

    /// Documents dropped as already seen
    pub duplicates: usize,

    /// Total checked
    pub total_checked: usize,
}

impl DedupCheckResult {
    pub fn new_count(&self) -> usize {
        self.new_documents.len()
    }

    /// Get deduplication ratio (0.0 = all new, 1.0 = all seen)
    pub fn dedup_ratio(&self) -> f64 {
        if self.total_checked == 0 {
            return 0.0;
        }
        self.duplicates as f64 / self.total_checked as f64
    }
}

// ============================================================================
// Tests
// ============================================================================
