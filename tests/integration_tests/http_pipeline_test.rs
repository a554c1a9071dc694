//! HTTP ingestion and webhook delivery through the orchestrator
//!
//! Both the open-data API and the webhook receiver are served by wiremock.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use legiswatch::ingest::{HttpAdapterConfig, HttpIngestionAdapter};
use legiswatch::notifications::{DeliveryService, Outbox, WebhookConfig, WebhookDispatcher};
use legiswatch::pipeline::{Orchestrator, PipelineComponents, PipelineSettings, RunOutcome, Trigger};
use legiswatch::storage::{JsonStateStore, StateStore};
use legiswatch::utils::retry::RetryConfig;

use super::fixtures::{PLENARY_DOCUMENTS_JSON, REPEATED_DOCUMENT_JSON, WATCHED};
use crate::common::{at, keywords};

fn http_adapter(server: &MockServer) -> Arc<HttpIngestionAdapter> {
    Arc::new(
        HttpIngestionAdapter::new(HttpAdapterConfig {
            base_url: server.uri(),
            endpoint: "/plenary-documents".to_string(),
            timeout: Duration::from_secs(5),
            page_limit: 50,
            ..Default::default()
        })
        .unwrap(),
    )
}

fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        ingestion_retry: RetryConfig::with_delays(2, 10, 20),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_fetch_match_and_deliver_over_http() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/plenary-documents"))
        .and(query_param("since", "2024-02-29T18:00:00+00:00"))
        .and(query_param("limit", "50"))
        .and(query_param("format", "json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(PLENARY_DOCUMENTS_JSON, "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/plenary-documents"))
        .and(query_param("since", "2024-03-01T18:00:00+00:00"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(REPEATED_DOCUMENT_JSON, "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hooks/reports"))
        .and(header("authorization", "Bearer s3cret"))
        .and(body_partial_json(serde_json::json!({
            "recipients": ["analyst@example.org"]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let dispatcher = WebhookDispatcher::new(
        WebhookConfig::new(format!("{}/hooks/reports", server.uri())).with_auth_token("s3cret"),
    )
    .unwrap();
    let store = Arc::new(JsonStateStore::new(temp.path().join("state.json")));

    let orchestrator = Orchestrator::new(
        PipelineComponents {
            keywords: keywords(WATCHED),
            adapter: http_adapter(&server),
            store: store.clone(),
            delivery: DeliveryService::new(
                Arc::new(dispatcher),
                BTreeSet::from(["analyst@example.org".to_string()]),
                2,
                Outbox::new(temp.path().join("outbox")),
            ),
        },
        fast_settings(),
    )
    .unwrap();

    // First evening run: both documents are new
    let first = orchestrator.submit(Trigger::daily(at("2024-03-01T18:00:00Z"))).await;
    assert_eq!(first[0].outcome, RunOutcome::Completed);
    assert_eq!(first[0].stats.fetched, 2);
    assert_eq!(first[0].stats.matched_documents, 1);

    let report = first[0].report.as_ref().unwrap();
    assert_eq!(report.rankings[0].keyword, "bitcoin");
    assert_eq!(report.rankings[0].total_occurrences, 3);
    assert_eq!(report.rankings[1].keyword, "blockchain");
    assert_eq!(report.rankings[1].total_occurrences, 1);
    assert!(first[0].delivery.as_ref().unwrap().is_delivered());

    // Second run: one repeat, one new document on the same date
    let second = orchestrator.submit(Trigger::daily(at("2024-03-01T20:00:00Z"))).await;
    assert_eq!(second[0].stats.duplicates, 1);
    assert_eq!(second[0].stats.new_documents, 1);

    let report = second[0].report.as_ref().unwrap();
    assert_eq!(report.rankings[0].keyword, "bitcoin");
    assert_eq!(report.rankings[0].total_occurrences, 5);
    assert_eq!(report.rankings[0].document_count, 2);
    assert_eq!(report.rankings[1].total_occurrences, 1);

    // State survives a reload from disk
    let persisted = store.load().unwrap();
    assert!(persisted.seen.has_seen("TA-9-2024-0101"));
    assert!(persisted.seen.has_seen("TA-9-2024-0103"));
    assert_eq!(persisted.last_fetch_at, Some(at("2024-03-01T20:00:00Z")));
}

#[tokio::test]
async fn test_rate_limited_then_recovered() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/plenary-documents"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/plenary-documents"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(REPEATED_DOCUMENT_JSON, "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(JsonStateStore::new(temp.path().join("state.json")));
    let orchestrator = Orchestrator::new(
        PipelineComponents {
            keywords: keywords(WATCHED),
            adapter: http_adapter(&server),
            store: store.clone(),
            delivery: DeliveryService::new(
                Arc::new(legiswatch::notifications::LogDispatcher),
                BTreeSet::new(),
                1,
                Outbox::new(temp.path().join("outbox")),
            ),
        },
        fast_settings(),
    )
    .unwrap();

    let reports = orchestrator.submit(Trigger::fetch(at("2024-03-01T10:00:00Z"))).await;

    assert_eq!(reports[0].outcome, RunOutcome::Completed);
    assert_eq!(reports[0].stats.new_documents, 2);
    assert_eq!(reports[0].stats.occurrences, 6);
    assert!(store.load().unwrap().seen.has_seen("TA-9-2024-0103"));
}

#[tokio::test]
async fn test_server_errors_exhaust_retries_and_skip() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/plenary-documents"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let store = Arc::new(JsonStateStore::new(temp.path().join("state.json")));
    let orchestrator = Orchestrator::new(
        PipelineComponents {
            keywords: keywords(WATCHED),
            adapter: http_adapter(&server),
            store: store.clone(),
            delivery: DeliveryService::new(
                Arc::new(legiswatch::notifications::LogDispatcher),
                BTreeSet::new(),
                1,
                Outbox::new(temp.path().join("outbox")),
            ),
        },
        fast_settings(),
    )
    .unwrap();

    let reports = orchestrator.submit(Trigger::fetch(at("2024-03-01T10:00:00Z"))).await;

    assert!(matches!(reports[0].outcome, RunOutcome::Skipped { .. }));
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_window_larger_than_one_page_is_fetched_completely() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    let doc = |i: u32| serde_json::json!({"id": format!("TA-9-2024-{i:04}"), "body": "bitcoin"});
    for (offset, body) in [
        ("0", serde_json::json!([doc(1), doc(2)])),
        ("2", serde_json::json!([doc(3)])),
    ] {
        Mock::given(method("GET"))
            .and(path("/plenary-documents"))
            .and(query_param("limit", "2"))
            .and(query_param("offset", offset))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let adapter = HttpIngestionAdapter::new(HttpAdapterConfig {
        base_url: server.uri(),
        endpoint: "/plenary-documents".to_string(),
        timeout: Duration::from_secs(5),
        page_limit: 2,
        ..Default::default()
    })
    .unwrap();
    let store = Arc::new(JsonStateStore::new(temp.path().join("state.json")));
    let orchestrator = Orchestrator::new(
        PipelineComponents {
            keywords: keywords(WATCHED),
            adapter: Arc::new(adapter),
            store: store.clone(),
            delivery: DeliveryService::new(
                Arc::new(legiswatch::notifications::LogDispatcher),
                BTreeSet::new(),
                1,
                Outbox::new(temp.path().join("outbox")),
            ),
        },
        fast_settings(),
    )
    .unwrap();

    let reports = orchestrator.submit(Trigger::fetch(at("2024-03-01T10:00:00Z"))).await;

    assert_eq!(reports[0].outcome, RunOutcome::Completed);
    assert_eq!(reports[0].stats.new_documents, 3);
    assert_eq!(reports[0].stats.occurrences, 3);

    let persisted = store.load().unwrap();
    assert!(persisted.seen.has_seen("TA-9-2024-0003"));
    assert_eq!(persisted.last_fetch_at, Some(at("2024-03-01T10:00:00Z")));
}
