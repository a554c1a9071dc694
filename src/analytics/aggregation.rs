//! Daily keyword aggregation
//!
//! Match records are folded into one [`DailyAggregate`] per calendar date.
//! Each keyword entry keeps the per-document occurrence map, so merging two
//! aggregates for the same date is a keyed union: a document already counted
//! for a keyword on that date is never counted twice, whatever the order or
//! split of the merges.
//!
//! The [`AggregationEngine`] owns the ordered, gapless series of aggregates.
//! Days without matches are stored as explicit empty aggregates and a date
//! becomes final as soon as a later date has been recorded.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::{ErrorCategory, LegiswatchErrorTrait};
use crate::matcher::KeywordSet;
use crate::models::MatchRecord;

/// Errors raised by the aggregation engine
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Aggregate for {date} is finalized (last recorded date is {last})")]
    DateFinalized { date: NaiveDate, last: NaiveDate },

    #[error("Cannot merge aggregate for {found} into aggregate for {expected}")]
    DateMismatch { expected: NaiveDate, found: NaiveDate },
}

impl LegiswatchErrorTrait for AggregationError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Aggregation
    }
}

/// Per-document occurrences of one keyword on one date
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordTally {
    documents: BTreeMap<String, u64>,
}

impl KeywordTally {
    /// Record a document's occurrences, keeping the larger count on a repeat
    ///
    /// Returns `true` if the document was not yet counted for this keyword.
    pub fn record(&mut self, document_id: &str, occurrences: u64) -> bool {
        match self.documents.get_mut(document_id) {
            Some(existing) => {
                *existing = (*existing).max(occurrences);
                false
            }
            None => {
                self.documents.insert(document_id.to_string(), occurrences);
                true
            }
        }
    }

    pub fn merge(&mut self, other: &KeywordTally) {
        for (document_id, &occurrences) in &other.documents {
            self.record(document_id, occurrences);
        }
    }

    pub fn total_occurrences(&self) -> u64 {
        self.documents.values().sum()
    }

    pub fn document_count(&self) -> u64 {
        self.documents.len() as u64
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.documents.contains_key(document_id)
    }
}

/// Summed statistics for one keyword
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTotals {
    pub keyword: String,
    pub total_occurrences: u64,
    pub document_count: u64,
}

/// Match statistics for one calendar date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    keywords: BTreeMap<String, KeywordTally>,
}

impl DailyAggregate {
    /// Create an empty aggregate
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            keywords: BTreeMap::new(),
        }
    }

    /// Fold one match record into the aggregate
    pub fn record(&mut self, record: &MatchRecord) -> bool {
        if record.occurrence_count == 0 {
            return false;
        }
        self.keywords
            .entry(record.keyword.clone())
            .or_default()
            .record(&record.document_id, record.occurrence_count)
    }

    /// Merge another aggregate for the same date
    pub fn merge(&mut self, other: &DailyAggregate) -> Result<(), AggregationError> {
        if other.date != self.date {
            return Err(AggregationError::DateMismatch {
                expected: self.date,
                found: other.date,
            });
        }

        for (keyword, tally) in &other.keywords {
            self.keywords.entry(keyword.clone()).or_default().merge(tally);
        }
        Ok(())
    }

    pub fn total_occurrences(&self, keyword: &str) -> u64 {
        self.keywords
            .get(keyword)
            .map_or(0, KeywordTally::total_occurrences)
    }

    pub fn document_count(&self, keyword: &str) -> u64 {
        self.keywords
            .get(keyword)
            .map_or(0, KeywordTally::document_count)
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Totals for every keyword with at least one match on this date
    pub fn totals(&self) -> Vec<KeywordTotals> {
        self.keywords
            .iter()
            .map(|(keyword, tally)| KeywordTotals {
                keyword: keyword.clone(),
                total_occurrences: tally.total_occurrences(),
                document_count: tally.document_count(),
            })
            .collect()
    }

    /// Keywords with at least one match on this date
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.keys().map(String::as_str)
    }
}

/// One day of a keyword's time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    pub date: NaiveDate,
    pub occurrences: u64,
    pub documents: u64,
}

/// Ordered, gapless daily series for one keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub keyword: String,
    pub points: Vec<DataPoint>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Daily occurrence counts in date order
    pub fn occurrences(&self) -> Vec<u64> {
        self.points.iter().map(|p| p.occurrences).collect()
    }
}

/// Owner of the gapless daily aggregate series
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationEngine {
    days: BTreeMap<NaiveDate, DailyAggregate>,
}

impl AggregationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an engine from persisted aggregates
    ///
    /// Aggregates for the same date are merged and any gap between recorded
    /// dates is filled with empty aggregates.
    pub fn from_aggregates<I>(aggregates: I) -> Result<Self, AggregationError>
    where
        I: IntoIterator<Item = DailyAggregate>,
    {
        let mut days: BTreeMap<NaiveDate, DailyAggregate> = BTreeMap::new();
        for aggregate in aggregates {
            match days.get_mut(&aggregate.date) {
                Some(existing) => existing.merge(&aggregate)?,
                None => {
                    days.insert(aggregate.date, aggregate);
                }
            }
        }

        let mut engine = Self { days };
        engine.fill_gaps();
        Ok(engine)
    }

    fn fill_gaps(&mut self) {
        let (Some(first), Some(last)) = (self.first_date(), self.last_date()) else {
            return;
        };
        for date in first.iter_days().take_while(|d| *d <= last) {
            self.days
                .entry(date)
                .or_insert_with(|| DailyAggregate::new(date));
        }
    }

    /// Merge match records into the aggregate for `date`
    ///
    /// Missing days between the last recorded date and `date` are created as
    /// empty aggregates. Dates before the last recorded date are final.
    pub fn absorb(
        &mut self,
        date: NaiveDate,
        matches: &[MatchRecord],
    ) -> Result<&DailyAggregate, AggregationError> {
        if let Some(last) = self.last_date() {
            if date < last {
                return Err(AggregationError::DateFinalized { date, last });
            }
            if let Some(next) = last.succ_opt() {
                for gap in next.iter_days().take_while(|d| *d < date) {
                    self.days.insert(gap, DailyAggregate::new(gap));
                }
            }
        }

        let aggregate = self
            .days
            .entry(date)
            .or_insert_with(|| DailyAggregate::new(date));
        for record in matches {
            aggregate.record(record);
        }

        tracing::debug!(
            date = %date,
            records = matches.len(),
            keywords = aggregate.keywords.len(),
            "Absorbed match records"
        );

        Ok(aggregate)
    }

    /// Gapless series for `keyword` over the `window_days` days ending at `as_of`
    ///
    /// The series starts at the later of the window start and the first
    /// recorded date, so days before monitoring began are not reported as
    /// zero. Days after the last recorded date up to `as_of` are zero-filled.
    pub fn history(&self, keyword: &str, window_days: u32, as_of: NaiveDate) -> TimeSeries {
        let mut series = TimeSeries {
            keyword: keyword.to_string(),
            points: Vec::new(),
        };

        let Some(first) = self.first_date() else {
            return series;
        };
        if window_days == 0 || as_of < first {
            return series;
        }

        let window_start = as_of
            .checked_sub_days(Days::new(u64::from(window_days) - 1))
            .unwrap_or(NaiveDate::MIN);
        let start = window_start.max(first);

        series.points = start
            .iter_days()
            .take_while(|d| *d <= as_of)
            .map(|date| match self.days.get(&date) {
                Some(aggregate) => DataPoint {
                    date,
                    occurrences: aggregate.total_occurrences(keyword),
                    documents: aggregate.document_count(keyword),
                },
                None => DataPoint {
                    date,
                    occurrences: 0,
                    documents: 0,
                },
            })
            .collect();

        series
    }

    /// Sum each keyword's statistics over `start..=end`
    ///
    /// Every keyword of the set is returned, including those without matches.
    pub fn totals(&self, keywords: &KeywordSet, start: NaiveDate, end: NaiveDate) -> Vec<KeywordTotals> {
        let range: Vec<&DailyAggregate> = if start <= end {
            self.days.range(start..=end).map(|(_, a)| a).collect()
        } else {
            Vec::new()
        };

        keywords
            .iter()
            .map(|keyword| {
                let text = keyword.text();
                KeywordTotals {
                    keyword: text.to_string(),
                    total_occurrences: range.iter().map(|a| a.total_occurrences(text)).sum(),
                    document_count: range.iter().map(|a| a.document_count(text)).sum(),
                }
            })
            .collect()
    }

    /// Drop aggregates dated before `cutoff`, returning how many were removed
    pub fn prune_before(&mut self, cutoff: NaiveDate) -> usize {
        let kept = self.days.split_off(&cutoff);
        let removed = self.days.len();
        self.days = kept;
        removed
    }

    pub fn aggregate(&self, date: NaiveDate) -> Option<&DailyAggregate> {
        self.days.get(&date)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.days.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Aggregates in date order
    pub fn aggregates(&self) -> impl Iterator<Item = &DailyAggregate> {
        self.days.values()
    }
}
