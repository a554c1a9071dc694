//! legiswatch - Legislative document monitor
//!
//! Periodically ingests legislative documents, flags those mentioning watched
//! keywords, aggregates the matches into a daily time series and forecasts
//! keyword trends for weekly reports.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration loading and validation
//! - [`ingest`] - Ingestion adapter trait and the HTTP adapter
//! - [`matcher`] - Aho-Corasick keyword matching
//! - [`analytics`] - Daily aggregation and trend forecasting
//! - [`report`] - Daily and weekly report assembly
//! - [`notifications`] - Report delivery, retries and the outbox
//! - [`storage`] - Seen set and persisted pipeline state
//! - [`pipeline`] - Trigger-driven orchestrator
//! - [`scheduler`] - Tick calculation for the daemon
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Retry and file helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use legiswatch::prelude::*;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load(None)?;
//! let components = PipelineComponents {
//!     keywords: config.monitor.keyword_set()?,
//!     adapter: Arc::new(HttpIngestionAdapter::new(config.ingestion.adapter_config())?),
//!     store: Arc::new(MemoryStateStore::new()),
//!     delivery: DeliveryService::new(
//!         Arc::new(LogDispatcher),
//!         Default::default(),
//!         config.notification.max_attempts,
//!         Outbox::new(&config.notification.outbox_dir),
//!     ),
//! };
//! let orchestrator = Orchestrator::new(components, PipelineSettings::from_config(&config)?)?;
//! orchestrator.submit(Trigger::daily(Utc::now())).await;
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod config;
pub mod error;
pub mod ingest;
pub mod matcher;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analytics::{AggregationEngine, ForecastEngine, TrendDirection, TrendForecast};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, LegiswatchErrorTrait, Result};
    pub use crate::ingest::{HttpIngestionAdapter, IngestionAdapter};
    pub use crate::matcher::{KeywordMatcher, KeywordSet, MatchOptions};
    pub use crate::models::{Document, MatchRecord};
    pub use crate::notifications::{DeliveryService, LogDispatcher, Outbox, WebhookDispatcher};
    pub use crate::pipeline::{
        Orchestrator, PipelineComponents, PipelineSettings, RunOutcome, Trigger, TriggerKind,
    };
    pub use crate::report::{Report, ReportAssembler};
    pub use crate::storage::{open_store, MemoryStateStore, PipelineSnapshot, StateStore};
}

// Direct re-exports for convenience
pub use models::{Document, MatchRecord};
