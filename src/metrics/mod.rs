//! Prometheus metrics for the monitoring pipeline
//!
//! This module provides metrics tracking for:
//! - Runs: outcome and duration per trigger kind
//! - Documents: fetched, deduplicated, matched
//! - Keywords: occurrences absorbed per keyword
//! - Delivery: failed report deliveries per channel
//! - State: seen-set size and series span after each commit
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_counter,
    register_int_counter_vec, CounterVec, Encoder, Gauge, HistogramVec, IntCounter,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

pub mod server;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all pipeline metrics
struct PipelineMetrics {
    runs: IntCounterVec,
    run_duration: HistogramVec,
    documents_fetched: IntCounter,
    documents_new: IntCounter,
    documents_duplicate: IntCounter,
    documents_matched: IntCounter,
    keyword_occurrences: CounterVec,
    delivery_failures: IntCounterVec,
    seen_entries: Gauge,
    series_days: Gauge,
    run_active: Gauge,
}

/// Global storage for pipeline metrics
static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, the error is returned and subsequent
/// metric operations become no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PipelineMetrics {
        runs: register_int_counter_vec!(
            "legiswatch_runs_total",
            "Pipeline runs by trigger and outcome",
            &["trigger", "outcome"]
        )?,
        run_duration: register_histogram_vec!(
            "legiswatch_run_duration_seconds",
            "Pipeline run duration in seconds",
            &["trigger"],
            vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
        )?,
        documents_fetched: register_int_counter!(
            "legiswatch_documents_fetched_total",
            "Documents returned by the ingestion adapter"
        )?,
        documents_new: register_int_counter!(
            "legiswatch_documents_new_total",
            "Fetched documents not seen before"
        )?,
        documents_duplicate: register_int_counter!(
            "legiswatch_documents_duplicate_total",
            "Fetched documents dropped as already seen"
        )?,
        documents_matched: register_int_counter!(
            "legiswatch_documents_matched_total",
            "New documents matching at least one keyword"
        )?,
        keyword_occurrences: register_counter_vec!(
            "legiswatch_keyword_occurrences_total",
            "Keyword occurrences absorbed into the aggregate series",
            &["keyword"]
        )?,
        delivery_failures: register_int_counter_vec!(
            "legiswatch_delivery_failures_total",
            "Reports that failed every delivery attempt",
            &["channel"]
        )?,
        seen_entries: register_gauge!(
            "legiswatch_seen_entries",
            "Document ids in the seen set"
        )?,
        series_days: register_gauge!(
            "legiswatch_series_days",
            "Days held in the aggregate series"
        )?,
        run_active: register_gauge!(
            "legiswatch_run_active",
            "Whether a pipeline run is in progress (1 = yes, 0 = no)"
        )?,
    };

    PIPELINE_METRICS
        .set(metrics)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    PIPELINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a run timer for a trigger kind
pub fn start_run_timer(trigger: &str) -> MetricsTimer {
    match PIPELINE_METRICS.get() {
        Some(m) => MetricsTimer::new(m.run_duration.with_label_values(&[trigger]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

/// Record the outcome of a run
pub fn record_run(trigger: &str, outcome: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.runs.with_label_values(&[trigger, outcome]).inc();
    }
}

/// Mark a run as started or finished
pub fn set_run_active(active: bool) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.run_active.set(if active { 1.0 } else { 0.0 });
    }
}

/// Record ingestion and deduplication results
pub fn record_dedup_results(fetched: usize, new_documents: usize) {
    let Some(m) = PIPELINE_METRICS.get() else {
        return;
    };

    m.documents_fetched.inc_by(fetched as u64);
    m.documents_new.inc_by(new_documents as u64);
    m.documents_duplicate
        .inc_by(fetched.saturating_sub(new_documents) as u64);
}

/// Record matching results
pub fn record_matches(matched_documents: usize, occurrences: &[(&str, u64)]) {
    let Some(m) = PIPELINE_METRICS.get() else {
        return;
    };

    m.documents_matched.inc_by(matched_documents as u64);
    for (keyword, count) in occurrences {
        if *count > 0 {
            m.keyword_occurrences
                .with_label_values(&[*keyword])
                .inc_by(*count as f64);
        }
    }
}

/// Record a report that failed every delivery attempt
pub fn record_delivery_failure(channel: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.delivery_failures.with_label_values(&[channel]).inc();
    }
}

/// Update committed-state gauges
pub fn update_state_gauges(seen_entries: usize, series_days: usize) {
    let Some(m) = PIPELINE_METRICS.get() else {
        return;
    };

    m.seen_entries.set(seen_entries as f64);
    m.series_days.set(series_days as f64);
}

// ============================================================================
// Tests
// ============================================================================
