//! Trigger-driven monitoring pipeline
//!
//! ```text
//!  trigger ──▶ Fetching ──▶ Deduplicating ──▶ Matching ──▶ Aggregating ──┐
//!                                                          (commit)      │
//!              ┌──────────────────────────────────────────────────────────┘
//!              ▼ daily / weekly only
//!          Reporting ──▶ Notifying ──▶ Idle
//! ```
//!
//! Only one run executes at a time. A trigger arriving during a run is parked
//! in a single pending slot and executed once the active run finishes.

mod orchestrator;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analytics::ForecastConfig;
use crate::config::{Config, ConfigError};
use crate::error::ErrorCategory;
use crate::notifications::DeliveryOutcome;
use crate::report::Report;
use crate::utils::retry::RetryConfig;

pub use orchestrator::{Orchestrator, PipelineComponents};

// ============================================================================
// Triggers
// ============================================================================

/// Kind of trigger, ordered by strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Fetch,
    Daily,
    Weekly,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    /// Whether this trigger ends with a report
    pub fn reports(&self) -> bool {
        !matches!(self, Self::Fetch)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fetch" => Ok(Self::Fetch),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(format!("unknown trigger '{other}'")),
        }
    }
}

/// A trigger firing at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub at: DateTime<Utc>,
}

impl Trigger {
    pub fn new(kind: TriggerKind, at: DateTime<Utc>) -> Self {
        Self { kind, at }
    }

    pub fn fetch(at: DateTime<Utc>) -> Self {
        Self::new(TriggerKind::Fetch, at)
    }

    pub fn daily(at: DateTime<Utc>) -> Self {
        Self::new(TriggerKind::Daily, at)
    }

    pub fn weekly(at: DateTime<Utc>) -> Self {
        Self::new(TriggerKind::Weekly, at)
    }

    /// Calendar date of the trigger at `offset`
    pub fn local_date(&self, offset: FixedOffset) -> NaiveDate {
        self.at.with_timezone(&offset).date_naive()
    }
}

// ============================================================================
// Run State and Results
// ============================================================================

/// Stage the pipeline is currently in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    Fetching,
    Deduplicating,
    Matching,
    Aggregating,
    Reporting,
    Notifying,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Deduplicating => "deduplicating",
            Self::Matching => "matching",
            Self::Aggregating => "aggregating",
            Self::Reporting => "reporting",
            Self::Notifying => "notifying",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a submitted trigger ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage ran and state was committed
    Completed,

    /// Ingestion kept failing transiently; nothing was committed
    Skipped { reason: String },

    /// Another run was active; the trigger waits in the pending slot
    Deferred,

    /// A stage failed; persisted state is as last committed
    Failed {
        category: ErrorCategory,
        error: String,
    },
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped { .. } => "skipped",
            Self::Deferred => "deferred",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Counters collected during one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub fetched: usize,
    pub new_documents: usize,
    pub duplicates: usize,
    pub matched_documents: usize,
    pub occurrences: u64,
    pub seen_pruned: usize,
    pub days_pruned: usize,
}

/// Result of handling one trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub trigger: Trigger,
    pub outcome: RunOutcome,
    pub stats: RunStats,

    /// Whether this run's state reached the store
    pub committed: bool,
    pub report: Option<Report>,
    #[serde(skip)]
    pub delivery: Option<DeliveryOutcome>,
}

impl RunReport {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            outcome: RunOutcome::Completed,
            stats: RunStats::default(),
            committed: false,
            report: None,
            delivery: None,
        }
    }

    pub fn deferred(trigger: Trigger) -> Self {
        Self {
            outcome: RunOutcome::Deferred,
            ..Self::new(trigger)
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Parameters the orchestrator needs from configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub forecast: ForecastConfig,
    pub ingestion_retry: RetryConfig,
    pub initial_lookback: chrono::Duration,
    pub seen_retention: chrono::Duration,
    pub series_retention_days: u32,
    pub utc_offset: FixedOffset,
    pub max_keywords_in_report: usize,
    pub fail_open: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            forecast: ForecastConfig::default(),
            ingestion_retry: RetryConfig::default(),
            initial_lookback: chrono::Duration::hours(24),
            seen_retention: chrono::Duration::days(90),
            series_retention_days: 365,
            utc_offset: Utc.fix(),
            max_keywords_in_report: 20,
            fail_open: false,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            forecast: config.forecast,
            ingestion_retry: config.ingestion.retry_config(),
            initial_lookback: config.ingestion.initial_lookback(),
            seen_retention: chrono::Duration::days(i64::from(config.storage.seen_retention_days)),
            series_retention_days: config.storage.series_retention_days,
            utc_offset: config.schedule.utc_offset()?,
            max_keywords_in_report: config.notification.max_keywords_in_report,
            fail_open: config.storage.fail_open,
        })
    }
}
