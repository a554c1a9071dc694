//! Error scenario tests
//!
//! Failures at each stage must leave committed state untouched and be
//! reported with the right category.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use legiswatch::error::ErrorCategory;
use legiswatch::ingest::{HttpAdapterConfig, HttpIngestionAdapter, IngestError, IngestionAdapter};
use legiswatch::notifications::{
    ChannelResult, DeliveryError, DeliveryOutcome, DeliveryService, NotificationDispatcher, Outbox,
};
use legiswatch::pipeline::{Orchestrator, PipelineComponents, PipelineSettings, RunOutcome, Trigger};
use legiswatch::models::MatchRecord;
use legiswatch::report::Report;
use legiswatch::storage::{MemoryStateStore, PipelineSnapshot, StateStore};

use super::fixtures::{MISSING_ID_JSON, WATCHED};
use crate::common::{at, document, keywords, RecordingDispatcher, ScriptedAdapter};

fn orchestrator(
    adapter: Arc<dyn IngestionAdapter>,
    store: Arc<MemoryStateStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    outbox: &TempDir,
    settings: PipelineSettings,
) -> Orchestrator {
    Orchestrator::new(
        PipelineComponents {
            keywords: keywords(WATCHED),
            adapter,
            store,
            delivery: DeliveryService::new(
                dispatcher,
                BTreeSet::from(["analyst@example.org".to_string()]),
                1,
                Outbox::new(outbox.path()),
            ),
        },
        settings,
    )
    .unwrap()
}

/// Dispatcher rejecting every report until switched on
#[derive(Default)]
struct FlakyDispatcher {
    rejections: AtomicUsize,
    accepted: std::sync::Mutex<Vec<String>>,
    healthy: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl NotificationDispatcher for FlakyDispatcher {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn deliver(&self, report: &Report, _recipients: &BTreeSet<String>) -> ChannelResult<()> {
        if self.healthy.load(Ordering::SeqCst) {
            self.accepted.lock().unwrap().push(report.id.clone());
            return Ok(());
        }
        self.rejections.fetch_add(1, Ordering::SeqCst);
        Err(DeliveryError::Rejected {
            status: 503,
            body: "maintenance".to_string(),
        })
    }
}

#[tokio::test]
async fn test_malformed_payload_aborts_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(MISSING_ID_JSON, "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = Arc::new(
        HttpIngestionAdapter::new(HttpAdapterConfig {
            base_url: server.uri(),
            endpoint: "documents".to_string(),
            timeout: Duration::from_secs(5),
            page_limit: 10,
            ..Default::default()
        })
        .unwrap(),
    );
    let store = Arc::new(MemoryStateStore::new());
    let outbox = TempDir::new().unwrap();
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let orchestrator = orchestrator(
        adapter,
        store.clone(),
        dispatcher.clone(),
        &outbox,
        PipelineSettings::default(),
    );

    let reports = orchestrator.submit(Trigger::daily(at("2024-03-01T18:00:00Z"))).await;

    match &reports[0].outcome {
        RunOutcome::Failed { category, error } => {
            assert_eq!(*category, ErrorCategory::Protocol);
            assert!(error.contains("no id"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(reports[0].report.is_none());
    assert!(dispatcher.reports().is_empty());
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test]
async fn test_commit_failure_is_retried_next_cycle() {
    let adapter = ScriptedAdapter::new(vec![
        Ok(vec![document("doc-1", "bitcoin")]),
        Ok(vec![document("doc-1", "bitcoin")]),
    ]);
    let store = Arc::new(MemoryStateStore::new());
    let outbox = TempDir::new().unwrap();
    let orchestrator = orchestrator(
        adapter.clone(),
        store.clone(),
        Arc::new(RecordingDispatcher::default()),
        &outbox,
        PipelineSettings::default(),
    );

    store.fail_next_commit();
    let failed = orchestrator.submit(Trigger::fetch(at("2024-03-01T10:00:00Z"))).await;
    assert!(matches!(
        failed[0].outcome,
        RunOutcome::Failed {
            category: ErrorCategory::Storage,
            ..
        }
    ));
    assert!(store.snapshot().seen.is_empty());

    // The document was never committed as seen, so it is counted now
    let retried = orchestrator.submit(Trigger::fetch(at("2024-03-01T11:00:00Z"))).await;
    assert_eq!(retried[0].outcome, RunOutcome::Completed);
    assert_eq!(retried[0].stats.new_documents, 1);

    // No watermark was committed, so the retry asked for the same first window
    assert_eq!(
        adapter.since_values(),
        vec![at("2024-02-29T10:00:00Z"), at("2024-02-29T10:00:00Z")]
    );
    assert_eq!(store.snapshot().last_fetch_at, Some(at("2024-03-01T11:00:00Z")));

    let snapshot = store.load().unwrap();
    let aggregate = snapshot.series.aggregate(chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    assert_eq!(aggregate.unwrap().total_occurrences("bitcoin"), 1);
}

#[tokio::test]
async fn test_unreadable_state_fails_closed() {
    let store = Arc::new(MemoryStateStore::new());
    store.set_fail_loads(true);
    let adapter = ScriptedAdapter::new(vec![Ok(vec![document("doc-1", "bitcoin")])]);
    let outbox = TempDir::new().unwrap();
    let orchestrator = orchestrator(
        adapter.clone(),
        store.clone(),
        Arc::new(RecordingDispatcher::default()),
        &outbox,
        PipelineSettings::default(),
    );

    let reports = orchestrator.submit(Trigger::fetch(at("2024-03-01T10:00:00Z"))).await;

    assert!(reports[0].outcome.is_failed());
    assert_eq!(adapter.calls(), 0);
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test]
async fn test_unreadable_state_fails_open_when_configured() {
    let mut history = PipelineSnapshot::default();
    history
        .series
        .absorb(
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            &[MatchRecord::new("doc-0", "bitcoin", 5).unwrap()],
        )
        .unwrap();
    history.seen.mark_seen("doc-0", at("2024-02-29T10:00:00Z"));
    history.last_fetch_at = Some(at("2024-02-29T10:00:00Z"));

    let store = Arc::new(MemoryStateStore::with_snapshot(history.clone()));
    store.set_fail_loads(true);
    let adapter = ScriptedAdapter::new(vec![
        Ok(vec![document("doc-0", "bitcoin"), document("doc-1", "bitcoin")]),
        Ok(vec![document("doc-0", "bitcoin"), document("doc-1", "bitcoin")]),
    ]);
    let outbox = TempDir::new().unwrap();
    let orchestrator = orchestrator(
        adapter.clone(),
        store.clone(),
        Arc::new(RecordingDispatcher::default()),
        &outbox,
        PipelineSettings {
            fail_open: true,
            ..Default::default()
        },
    );

    let reports = orchestrator.submit(Trigger::fetch(at("2024-03-01T10:00:00Z"))).await;

    // Documents are processed as unseen but stored history is left alone
    assert_eq!(reports[0].outcome, RunOutcome::Completed);
    assert_eq!(reports[0].stats.new_documents, 2);
    assert!(!reports[0].committed);
    assert_eq!(adapter.calls(), 1);
    assert_eq!(store.snapshot(), history);

    store.set_fail_loads(false);
    let reports = orchestrator.submit(Trigger::fetch(at("2024-03-01T11:00:00Z"))).await;

    assert!(reports[0].committed);
    assert_eq!(reports[0].stats.duplicates, 1);
    assert_eq!(adapter.since_values()[1], at("2024-02-29T10:00:00Z"));

    let snapshot = store.snapshot();
    let earlier = snapshot.series.aggregate(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    assert_eq!(earlier.unwrap().total_occurrences("bitcoin"), 5);
    assert!(snapshot.seen.has_seen("doc-0"));
    assert!(snapshot.seen.has_seen("doc-1"));
}

#[tokio::test]
async fn test_protocol_error_is_not_retried() {
    let adapter = ScriptedAdapter::new(vec![Err(IngestError::Protocol(
        "HTTP 400 Bad Request".to_string(),
    ))]);
    let store = Arc::new(MemoryStateStore::new());
    let outbox = TempDir::new().unwrap();
    let orchestrator = orchestrator(
        adapter.clone(),
        store,
        Arc::new(RecordingDispatcher::default()),
        &outbox,
        PipelineSettings::default(),
    );

    let reports = orchestrator.submit(Trigger::fetch(at("2024-03-01T10:00:00Z"))).await;

    assert!(reports[0].outcome.is_failed());
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn test_undeliverable_report_is_outboxed_and_resent() {
    let adapter = ScriptedAdapter::new(vec![Ok(vec![document("doc-1", "bitcoin")])]);
    let store = Arc::new(MemoryStateStore::new());
    let outbox_dir = TempDir::new().unwrap();
    let dispatcher = Arc::new(FlakyDispatcher::default());
    let orchestrator = orchestrator(
        adapter,
        store.clone(),
        dispatcher.clone(),
        &outbox_dir,
        PipelineSettings::default(),
    );

    let reports = orchestrator.submit(Trigger::daily(at("2024-03-01T18:00:00Z"))).await;

    // Delivery failure does not fail the run or roll back state
    assert_eq!(reports[0].outcome, RunOutcome::Completed);
    assert!(matches!(
        reports[0].delivery,
        Some(DeliveryOutcome::Outboxed { attempts: 1, .. })
    ));
    assert!(store.snapshot().seen.has_seen("doc-1"));
    assert_eq!(dispatcher.rejections.load(Ordering::SeqCst), 1);

    let outbox = Outbox::new(outbox_dir.path());
    assert_eq!(outbox.pending().unwrap().len(), 1);

    dispatcher.healthy.store(true, Ordering::SeqCst);
    let summary = outbox.resend(dispatcher.as_ref()).await.unwrap();

    assert_eq!(summary.delivered, 1);
    assert!(outbox.pending().unwrap().is_empty());
    assert_eq!(
        dispatcher.accepted.lock().unwrap().clone(),
        vec!["daily-2024-03-01".to_string()]
    );
}
