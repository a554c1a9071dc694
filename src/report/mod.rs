//! Structured daily and weekly reports
//!
//! The assembler is pure: it turns aggregates and forecasts into a [`Report`]
//! value and leaves rendering to the notification channels.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::analytics::{DailyAggregate, KeywordTotals, TrendDirection, TrendForecast};

/// Kind of report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Daily,
    Weekly,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive date range covered by a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window covering a single date
    pub fn day(date: NaiveDate) -> Self {
        Self::new(date, date)
    }
}

/// One ranked keyword in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRanking {
    pub rank: usize,
    pub keyword: String,
    pub total_occurrences: u64,
    pub document_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<TrendForecast>,
}

/// Keyword with a rising or falling forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendHighlight {
    pub keyword: String,
    pub direction: TrendDirection,
    pub slope: f64,
    pub predicted_next_period_count: f64,
    pub confidence: f64,
}

/// A structured report handed to the notification dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Deterministic identifier derived from kind and window
    pub id: String,
    pub kind: ReportKind,
    pub window: ReportWindow,
    pub generated_at: DateTime<Utc>,
    pub rankings: Vec<KeywordRanking>,

    /// Number of ranked keywords dropped by the size limit
    pub truncated: usize,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<TrendHighlight>,

    /// Keywords without enough history for a forecast
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insufficient_data: Vec<String>,
}

impl Report {
    /// One-line description for logs
    pub fn summary(&self) -> String {
        let top = self
            .rankings
            .first()
            .map(|r| format!(", top: {} ({})", r.keyword, r.total_occurrences))
            .unwrap_or_default();
        let window = if self.window.start == self.window.end {
            self.window.end.to_string()
        } else {
            format!("{}..{}", self.window.start, self.window.end)
        };

        format!(
            "{} report {}: {} keywords{}, {} highlights",
            self.kind,
            window,
            self.rankings.len() + self.truncated,
            top,
            self.highlights.len()
        )
    }

    pub fn is_empty(&self) -> bool {
        self.rankings.is_empty() && self.highlights.is_empty()
    }
}

/// Builds reports from aggregates and forecasts
#[derive(Debug, Clone, Copy)]
pub struct ReportAssembler {
    max_keywords: usize,
}

impl Default for ReportAssembler {
    fn default() -> Self {
        Self::new(20)
    }
}

impl ReportAssembler {
    pub fn new(max_keywords: usize) -> Self {
        Self { max_keywords }
    }

    /// Daily report for the keywords matched on `date`
    pub fn build_daily(
        &self,
        date: NaiveDate,
        aggregate: &DailyAggregate,
        generated_at: DateTime<Utc>,
    ) -> Report {
        let (rankings, truncated) = self.rank(aggregate.totals(), &HashMap::new());

        Report {
            id: format!("daily-{date}"),
            kind: ReportKind::Daily,
            window: ReportWindow::day(date),
            generated_at,
            rankings,
            truncated,
            highlights: Vec::new(),
            insufficient_data: Vec::new(),
        }
    }

    /// Weekly report ranking `totals` over `window` with forecasts attached
    pub fn build_weekly(
        &self,
        totals: Vec<KeywordTotals>,
        forecasts: Vec<TrendForecast>,
        window: ReportWindow,
        generated_at: DateTime<Utc>,
    ) -> Report {
        let mut insufficient_data: Vec<String> = forecasts
            .iter()
            .filter(|f| f.direction == TrendDirection::InsufficientData)
            .map(|f| f.keyword.clone())
            .collect();
        insufficient_data.sort();

        let mut highlights: Vec<TrendHighlight> = forecasts
            .iter()
            .filter(|f| f.direction.is_notable())
            .filter_map(|f| {
                Some(TrendHighlight {
                    keyword: f.keyword.clone(),
                    direction: f.direction,
                    slope: f.slope?,
                    predicted_next_period_count: f.predicted_next_period_count?,
                    confidence: f.confidence,
                })
            })
            .collect();
        highlights.sort_by(|a, b| {
            b.slope
                .abs()
                .partial_cmp(&a.slope.abs())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.keyword.cmp(&b.keyword))
        });
        highlights.truncate(self.max_keywords);

        let by_keyword: HashMap<String, TrendForecast> = forecasts
            .into_iter()
            .map(|f| (f.keyword.clone(), f))
            .collect();
        let (rankings, truncated) = self.rank(totals, &by_keyword);

        Report {
            id: format!("weekly-{}-{}", window.start, window.end),
            kind: ReportKind::Weekly,
            window,
            generated_at,
            rankings,
            truncated,
            highlights,
            insufficient_data,
        }
    }

    /// Rank keywords with matches, returning the kept entries and the dropped count
    fn rank(
        &self,
        totals: Vec<KeywordTotals>,
        forecasts: &HashMap<String, TrendForecast>,
    ) -> (Vec<KeywordRanking>, usize) {
        let mut totals: Vec<KeywordTotals> = totals
            .into_iter()
            .filter(|t| t.total_occurrences > 0)
            .collect();
        totals.sort_by(|a, b| {
            b.total_occurrences
                .cmp(&a.total_occurrences)
                .then_with(|| b.document_count.cmp(&a.document_count))
                .then_with(|| a.keyword.cmp(&b.keyword))
        });

        let truncated = totals.len().saturating_sub(self.max_keywords);
        totals.truncate(self.max_keywords);

        let rankings = totals
            .into_iter()
            .enumerate()
            .map(|(i, t)| KeywordRanking {
                rank: i + 1,
                forecast: forecasts.get(&t.keyword).cloned(),
                keyword: t.keyword,
                total_occurrences: t.total_occurrences,
                document_count: t.document_count,
            })
            .collect();

        (rankings, truncated)
    }
}
