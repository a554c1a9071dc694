//! End-to-end pipeline integration tests
//!
//! Tests the complete workflow:
//! 1. Trigger submission
//! 2. Fetch through the ingestion adapter (scripted)
//! 3. Deduplication against the committed seen set
//! 4. Keyword matching and daily aggregation
//! 5. Report assembly, forecasting and delivery

use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;

use legiswatch::analytics::{
    period_totals, ForecastConfig, ForecastEngine, ForecastModel, TimeSeries, TrendDirection,
    TrendForecast,
};
use legiswatch::ingest::{IngestError, IngestionAdapter};
use legiswatch::models::{Document, MatchRecord};
use legiswatch::notifications::{DeliveryService, Outbox};
use legiswatch::pipeline::{
    Orchestrator, PipelineComponents, PipelineSettings, RunOutcome, Trigger,
};
use legiswatch::report::ReportKind;
use legiswatch::storage::{MemoryStateStore, PipelineSnapshot, StateStore};

use super::fixtures::WATCHED;
use crate::common::{at, document, keywords, RecordingDispatcher, ScriptedAdapter};

// ============================================================================
// Helpers
// ============================================================================

struct Pipeline {
    orchestrator: Arc<Orchestrator>,
    store: Arc<MemoryStateStore>,
    dispatcher: Arc<RecordingDispatcher>,
    _outbox: TempDir,
}

fn pipeline(adapter: Arc<dyn IngestionAdapter>, store: MemoryStateStore) -> Pipeline {
    pipeline_with(adapter, store, None)
}

fn pipeline_with(
    adapter: Arc<dyn IngestionAdapter>,
    store: MemoryStateStore,
    forecaster: Option<ForecastEngine>,
) -> Pipeline {
    let store = Arc::new(store);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let outbox = TempDir::new().unwrap();

    let orchestrator = Orchestrator::new(
        PipelineComponents {
            keywords: keywords(WATCHED),
            adapter,
            store: store.clone(),
            delivery: DeliveryService::new(
                dispatcher.clone(),
                BTreeSet::from(["analyst@example.org".to_string()]),
                2,
                Outbox::new(outbox.path()),
            ),
        },
        PipelineSettings::default(),
    )
    .unwrap();
    let orchestrator = match forecaster {
        Some(forecaster) => orchestrator.with_forecaster(forecaster),
        None => orchestrator,
    };

    Pipeline {
        orchestrator: Arc::new(orchestrator),
        store,
        dispatcher,
        _outbox: outbox,
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Complete Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_two_documents_on_one_date() {
    let adapter = ScriptedAdapter::new(vec![Ok(vec![
        document("doc-1", "The committee discussed bitcoin."),
        document("doc-2", "A bitcoin amendment was tabled."),
    ])]);
    let p = pipeline(adapter, MemoryStateStore::new());

    let reports = p.orchestrator.submit(Trigger::daily(at("2024-03-01T18:00:00Z"))).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, RunOutcome::Completed);

    let report = reports[0].report.as_ref().unwrap();
    assert_eq!(report.kind, ReportKind::Daily);
    assert_eq!(report.id, "daily-2024-03-01");
    assert_eq!(report.rankings.len(), 1);
    assert_eq!(report.rankings[0].keyword, "bitcoin");
    assert_eq!(report.rankings[0].total_occurrences, 2);
    assert_eq!(report.rankings[0].document_count, 2);

    let delivered = p.dispatcher.reports();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].id, "daily-2024-03-01");
}

#[tokio::test]
async fn test_rerun_with_seen_documents_changes_nothing() {
    let batch = vec![
        document("doc-1", "bitcoin and blockchain"),
        document("doc-2", "blockchain"),
    ];
    let adapter = ScriptedAdapter::new(vec![Ok(batch.clone()), Ok(batch)]);
    let p = pipeline(adapter, MemoryStateStore::new());

    p.orchestrator.submit(Trigger::fetch(at("2024-03-01T10:00:00Z"))).await;
    let first = p.store.snapshot();

    let reports = p.orchestrator.submit(Trigger::fetch(at("2024-03-01T11:00:00Z"))).await;
    assert_eq!(reports[0].stats.new_documents, 0);
    assert_eq!(reports[0].stats.duplicates, 2);

    let second = p.store.snapshot();
    assert_eq!(first.series, second.series);
    assert_eq!(first.seen, second.seen);
    let aggregate = second.series.aggregate(day(2024, 3, 1)).unwrap();
    assert_eq!(aggregate.document_count("blockchain"), 2);
    assert_eq!(aggregate.document_count("bitcoin"), 1);
}

#[tokio::test]
async fn test_watermark_drives_since() {
    let adapter = ScriptedAdapter::new(vec![]);
    let p = pipeline(adapter.clone(), MemoryStateStore::new());

    p.orchestrator.submit(Trigger::fetch(at("2024-03-01T10:00:00Z"))).await;
    p.orchestrator.submit(Trigger::fetch(at("2024-03-01T11:00:00Z"))).await;

    assert_eq!(
        adapter.since_values(),
        vec![at("2024-02-29T10:00:00Z"), at("2024-03-01T10:00:00Z")]
    );
    assert_eq!(p.store.snapshot().last_fetch_at, Some(at("2024-03-01T11:00:00Z")));
}

#[tokio::test]
async fn test_fetch_gap_creates_empty_days() {
    let adapter = ScriptedAdapter::new(vec![
        Ok(vec![document("doc-1", "bitcoin")]),
        Ok(vec![document("doc-2", "bitcoin")]),
    ]);
    let p = pipeline(adapter, MemoryStateStore::new());

    p.orchestrator.submit(Trigger::fetch(at("2024-03-01T10:00:00Z"))).await;
    p.orchestrator.submit(Trigger::fetch(at("2024-03-04T10:00:00Z"))).await;

    let series = p.store.snapshot().series;
    assert_eq!(series.len(), 4);
    assert!(series.aggregate(day(2024, 3, 2)).unwrap().is_empty());
    assert_eq!(series.aggregate(day(2024, 3, 4)).unwrap().total_occurrences("bitcoin"), 1);
}

#[tokio::test]
async fn test_weekly_report_with_rising_trend() {
    // Six full weeks ending the day before the weekly tick, rising by one per week
    let tick_day = day(2024, 4, 14);
    let first_day = tick_day - Duration::days(41);
    let mut snapshot = PipelineSnapshot::default();
    for week in 0..6u64 {
        let date = first_day + Duration::days(7 * week as i64);
        snapshot
            .series
            .absorb(
                date,
                &[MatchRecord::new(format!("w{week}"), "bitcoin", week + 1).unwrap()],
            )
            .unwrap();
    }
    snapshot
        .series
        .absorb(tick_day - Duration::days(1), &[])
        .unwrap();

    let adapter = ScriptedAdapter::new(vec![]);
    let p = pipeline(adapter, MemoryStateStore::with_snapshot(snapshot));

    let reports = p.orchestrator.submit(Trigger::weekly(at("2024-04-14T18:00:00Z"))).await;
    let report = reports[0].report.as_ref().unwrap();

    assert_eq!(report.kind, ReportKind::Weekly);
    assert_eq!(report.id, "weekly-2024-04-08-2024-04-14");
    assert_eq!(report.highlights.len(), 1);
    let highlight = &report.highlights[0];
    assert_eq!(highlight.keyword, "bitcoin");
    assert_eq!(highlight.direction, TrendDirection::Rising);
    assert!(highlight.predicted_next_period_count > 6.0);

    // Six weeks of zeros is a flat trend, not missing data
    assert!(report.insufficient_data.is_empty());
    assert_eq!(report.rankings.len(), 1);
    assert_eq!(report.rankings[0].total_occurrences, 6);
    let forecast = report.rankings[0].forecast.as_ref().unwrap();
    assert_eq!(forecast.periods_used, 6);
}

#[tokio::test]
async fn test_weekly_report_with_short_history() {
    let adapter = ScriptedAdapter::new(vec![Ok(vec![document("doc-1", "bitcoin")])]);
    let p = pipeline(adapter, MemoryStateStore::new());

    let reports = p.orchestrator.submit(Trigger::weekly(at("2024-03-03T18:00:00Z"))).await;
    let report = reports[0].report.as_ref().unwrap();

    assert!(report.highlights.is_empty());
    assert_eq!(
        report.insufficient_data,
        vec!["bitcoin".to_string(), "blockchain".to_string()]
    );
    assert_eq!(report.rankings[0].keyword, "bitcoin");
}

/// Predicts one more than the last day's count, whatever the history length
struct NextDayModel;

impl ForecastModel for NextDayModel {
    fn name(&self) -> &'static str {
        "next-day"
    }

    fn forecast(&self, keyword: &str, history: &TimeSeries) -> TrendForecast {
        let last = period_totals(history, 1).last().copied().unwrap_or(0) as f64;
        TrendForecast {
            keyword: keyword.to_string(),
            direction: if last > 0.0 { TrendDirection::Rising } else { TrendDirection::Flat },
            slope: Some(1.0),
            predicted_next_period_count: Some(last + 1.0),
            confidence: 0.5,
            periods_used: history.len(),
        }
    }
}

#[tokio::test]
async fn test_weekly_report_uses_configured_forecast_model() {
    let adapter = ScriptedAdapter::new(vec![Ok(vec![document("doc-1", "bitcoin bitcoin")])]);
    let forecaster = ForecastEngine::with_model(ForecastConfig::default(), Box::new(NextDayModel));
    let p = pipeline_with(adapter, MemoryStateStore::new(), Some(forecaster));

    let reports = p.orchestrator.submit(Trigger::weekly(at("2024-03-03T18:00:00Z"))).await;
    let report = reports[0].report.as_ref().unwrap();

    // The linear model would call one day of history insufficient
    assert!(report.insufficient_data.is_empty());
    assert_eq!(report.highlights.len(), 1);
    assert_eq!(report.highlights[0].keyword, "bitcoin");
    assert_eq!(report.highlights[0].direction, TrendDirection::Rising);
    assert_eq!(report.highlights[0].predicted_next_period_count, 3.0);
    assert_eq!(report.rankings[0].forecast.as_ref().unwrap().periods_used, 1);
}

#[tokio::test]
async fn test_daily_and_weekly_on_same_tick() {
    let adapter = ScriptedAdapter::new(vec![Ok(vec![document("doc-1", "blockchain")])]);
    let p = pipeline(adapter, MemoryStateStore::new());
    let tick = at("2024-03-03T18:00:00Z");

    p.orchestrator.submit(Trigger::daily(tick)).await;
    p.orchestrator.submit(Trigger::weekly(tick)).await;

    let ids: Vec<String> = p.dispatcher.reports().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["daily-2024-03-03", "weekly-2024-02-26-2024-03-03"]);
}

// ============================================================================
// Re-entrancy
// ============================================================================

/// Adapter that blocks its first fetch until released
struct GatedAdapter {
    started: Notify,
    release: Notify,
    inner: Arc<ScriptedAdapter>,
}

#[async_trait::async_trait]
impl IngestionAdapter for GatedAdapter {
    fn name(&self) -> &str {
        "gated"
    }

    async fn fetch(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Document>, IngestError> {
        if self.inner.calls() == 0 {
            self.started.notify_one();
            self.release.notified().await;
        }
        self.inner.fetch(since).await
    }
}

#[tokio::test]
async fn test_trigger_during_run_is_deferred() {
    let adapter = Arc::new(GatedAdapter {
        started: Notify::new(),
        release: Notify::new(),
        inner: ScriptedAdapter::new(vec![Ok(vec![document("doc-1", "bitcoin")])]),
    });
    let p = pipeline(adapter.clone(), MemoryStateStore::new());

    let orchestrator = p.orchestrator.clone();
    let active = tokio::spawn(async move {
        orchestrator
            .submit(Trigger::fetch(at("2024-03-01T10:00:00Z")))
            .await
    });
    adapter.started.notified().await;

    let deferred = p.orchestrator.submit(Trigger::daily(at("2024-03-01T10:05:00Z"))).await;
    assert_eq!(deferred.len(), 1);
    assert_eq!(deferred[0].outcome, RunOutcome::Deferred);

    // A weaker trigger does not replace the pending daily run
    p.orchestrator.submit(Trigger::fetch(at("2024-03-01T10:06:00Z"))).await;
    assert_eq!(
        p.orchestrator.pending(),
        Some(Trigger::daily(at("2024-03-01T10:05:00Z")))
    );

    adapter.release.notify_one();
    let reports = active.await.unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].trigger, Trigger::fetch(at("2024-03-01T10:00:00Z")));
    assert_eq!(reports[1].trigger, Trigger::daily(at("2024-03-01T10:05:00Z")));
    assert!(reports[1].report.is_some());
    assert_eq!(p.orchestrator.pending(), None);
    assert_eq!(p.dispatcher.reports().len(), 1);
    assert_eq!(p.store.commit_count(), 2);
    assert!(p.store.load().unwrap().seen.has_seen("doc-1"));
}
