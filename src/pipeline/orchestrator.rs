//! Pipeline orchestrator
//!
//! The orchestrator owns every component of a run behind a single
//! `tokio::sync::Mutex`. Each run works on a copy of the last committed
//! snapshot and replaces it only after the state store accepted the commit,
//! so a failed stage never leaves the seen set or the series half updated.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use super::{PipelineSettings, PipelineState, RunOutcome, RunReport, Trigger, TriggerKind};
use crate::analytics::{DailyAggregate, ForecastEngine};
use crate::error::{Error, LegiswatchErrorTrait, Result};
use crate::ingest::{IngestError, IngestionAdapter};
use crate::matcher::{KeywordMatcher, KeywordSet};
use crate::metrics;
use crate::models::{Document, MatchRecord};
use crate::notifications::DeliveryService;
use crate::report::{Report, ReportAssembler, ReportWindow};
use crate::storage::{PipelineSnapshot, StateStore};
use crate::utils::retry::{with_retry_if, RetryDecision};

/// External collaborators of the pipeline
pub struct PipelineComponents {
    pub keywords: KeywordSet,
    pub adapter: Arc<dyn IngestionAdapter>,
    pub store: Arc<dyn StateStore>,
    pub delivery: DeliveryService,
}

/// Everything a run touches, guarded by the run lock
struct RunContext {
    keywords: KeywordSet,
    matcher: Arc<KeywordMatcher>,
    adapter: Arc<dyn IngestionAdapter>,
    store: Arc<dyn StateStore>,
    delivery: DeliveryService,
    forecaster: ForecastEngine,
    assembler: ReportAssembler,

    /// Last snapshot accepted by the store, loaded on first use
    committed: Option<PipelineSnapshot>,

    /// Lower bound of the first fetch window, kept until a watermark is committed
    first_since: Option<DateTime<Utc>>,
}

/// Snapshot a run starts from
struct LoadedState {
    snapshot: PipelineSnapshot,

    /// False when the store could not be read and the run continues fail-open
    durable: bool,
}

/// Result of the fetch stage
enum FetchResult {
    Fetched(Vec<Document>),
    Skipped(String),
}

/// Runs triggers one at a time against the configured components
pub struct Orchestrator {
    context: tokio::sync::Mutex<RunContext>,
    pending: Mutex<Option<Trigger>>,
    state: Mutex<PipelineState>,
    settings: PipelineSettings,
    shutdown: watch::Receiver<bool>,
}

impl Orchestrator {
    /// Build an orchestrator; the keyword automaton is compiled here
    pub fn new(components: PipelineComponents, settings: PipelineSettings) -> Result<Self> {
        let matcher = KeywordMatcher::new(&components.keywords)?;
        let forecaster = ForecastEngine::new(settings.forecast);
        let (_, shutdown) = watch::channel(false);

        tracing::info!(
            keywords = components.keywords.len(),
            adapter = components.adapter.name(),
            store = components.store.name(),
            channel = components.delivery.dispatcher_name(),
            forecast_model = forecaster.model_name(),
            "Pipeline orchestrator ready"
        );

        Ok(Self {
            context: tokio::sync::Mutex::new(RunContext {
                keywords: components.keywords,
                matcher: Arc::new(matcher),
                adapter: components.adapter,
                store: components.store,
                delivery: components.delivery,
                forecaster,
                assembler: ReportAssembler::new(settings.max_keywords_in_report),
                committed: None,
                first_since: None,
            }),
            pending: Mutex::new(None),
            state: Mutex::new(PipelineState::Idle),
            settings,
            shutdown,
        })
    }

    /// Forecast weekly reports with `forecaster` instead of the linear model
    pub fn with_forecaster(mut self, forecaster: ForecastEngine) -> Self {
        tracing::info!(forecast_model = forecaster.model_name(), "Forecast model replaced");
        self.context.get_mut().forecaster = forecaster;
        self
    }

    /// Stop between stages once `shutdown` turns true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Trigger waiting for the active run to finish
    pub fn pending(&self) -> Option<Trigger> {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle a trigger
    ///
    /// If no run is active the trigger runs immediately, followed by any
    /// trigger parked meanwhile. Otherwise it is parked and reported as
    /// deferred. One report is returned per trigger handled by this call.
    pub async fn submit(&self, trigger: Trigger) -> Vec<RunReport> {
        let mut reports = Vec::new();
        let mut current = trigger;

        loop {
            let mut context = match self.context.try_lock() {
                Ok(context) => context,
                Err(_) => {
                    self.park(current);
                    metrics::record_run(current.kind.as_str(), RunOutcome::Deferred.as_str());
                    reports.push(RunReport::deferred(current));

                    // The active run may have drained the slot before we parked
                    let Ok(context) = self.context.try_lock() else {
                        break;
                    };
                    let Some(parked) = self.take_pending() else {
                        break;
                    };
                    current = parked;
                    context
                }
            };

            reports.push(self.execute(&mut context, current).await);
            drop(context);

            match self.take_pending() {
                Some(parked) => current = parked,
                None => break,
            }
        }

        reports
    }

    /// Park `trigger` in the pending slot, returning the trigger that lost its place
    fn park(&self, trigger: Trigger) -> Option<Trigger> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let lost = match *pending {
            Some(existing) if existing.kind > trigger.kind => Some(trigger),
            existing => {
                tracing::info!(trigger = %trigger.kind, at = %trigger.at, "Run active, trigger deferred");
                *pending = Some(trigger);
                existing
            }
        };
        drop(pending);

        if let Some(lost) = lost {
            metrics::record_run(lost.kind.as_str(), "dropped");
            // A dropped fetch is covered by the pending run's own fetch; a report is not
            if lost.kind.reports() {
                tracing::warn!(
                    dropped = %lost.kind,
                    at = %lost.at,
                    "Run active, pending slot taken by a stronger trigger, report skipped"
                );
            } else {
                tracing::debug!(dropped = %lost.kind, at = %lost.at, "Pending fetch superseded");
            }
        }
        lost
    }

    fn take_pending(&self) -> Option<Trigger> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn enter(&self, state: PipelineState) -> Result<()> {
        if *self.shutdown.borrow() {
            return Err(Error::Cancelled {
                stage: state.as_str(),
            });
        }
        tracing::debug!(stage = %state, "Entering stage");
        self.set_state(state);
        Ok(())
    }

    async fn execute(&self, context: &mut RunContext, trigger: Trigger) -> RunReport {
        let _timer = metrics::start_run_timer(trigger.kind.as_str());
        metrics::set_run_active(true);
        tracing::info!(trigger = %trigger.kind, at = %trigger.at, "Run started");

        let mut report = RunReport::new(trigger);
        if let Err(e) = self.run_stages(context, &mut report).await {
            report.outcome = RunOutcome::Failed {
                category: e.category(),
                error: e.to_string(),
            };
        }

        self.set_state(PipelineState::Idle);
        metrics::set_run_active(false);
        metrics::record_run(trigger.kind.as_str(), report.outcome.as_str());

        match &report.outcome {
            RunOutcome::Failed { category, error } => tracing::error!(
                trigger = %trigger.kind,
                category = %category,
                error = %error,
                "Run failed"
            ),
            RunOutcome::Skipped { reason } => tracing::warn!(
                trigger = %trigger.kind,
                reason = %reason,
                "Fetch cycle skipped"
            ),
            _ => tracing::info!(
                trigger = %trigger.kind,
                fetched = report.stats.fetched,
                new = report.stats.new_documents,
                matched = report.stats.matched_documents,
                "Run completed"
            ),
        }

        report
    }

    async fn run_stages(&self, context: &mut RunContext, report: &mut RunReport) -> Result<()> {
        let trigger = report.trigger;
        let LoadedState {
            snapshot: mut working,
            mut durable,
        } = self.committed_snapshot(context)?;

        self.enter(PipelineState::Fetching)?;
        let since = match working.last_fetch_at {
            Some(watermark) => watermark,
            None => *context
                .first_since
                .get_or_insert(trigger.at - self.settings.initial_lookback),
        };

        match self.fetch(context.adapter.as_ref(), since).await? {
            FetchResult::Fetched(documents) => {
                if !durable {
                    if let Some(recovered) = Self::reload(context) {
                        working = recovered;
                        durable = true;
                    }
                }

                let next = self.ingest(context, working, documents, report).await?;

                if durable {
                    context.store.commit(&next)?;
                    metrics::update_state_gauges(next.seen.len(), next.series.len());
                    tracing::debug!(
                        store = context.store.name(),
                        seen = next.seen.len(),
                        days = next.series.len(),
                        "State committed"
                    );
                    context.committed = Some(next.clone());
                    context.first_since = None;
                    report.committed = true;
                } else {
                    tracing::warn!(
                        store = context.store.name(),
                        new = report.stats.new_documents,
                        "State store unreadable, run results kept out of the store"
                    );
                }
                working = next;
            }
            FetchResult::Skipped(reason) => {
                report.outcome = RunOutcome::Skipped { reason };
            }
        }

        if !trigger.kind.reports() {
            return Ok(());
        }

        self.enter(PipelineState::Reporting)?;
        let built = self.build_report(context, &working, trigger);
        tracing::info!(report = %built.id, summary = %built.summary(), "Report built");

        self.enter(PipelineState::Notifying)?;
        let delivery = context.delivery.deliver(&built).await?;
        report.delivery = Some(delivery);
        report.report = Some(built);
        Ok(())
    }

    /// Last committed snapshot, loading it from the store on first use
    ///
    /// With `fail_open` an unreadable store yields an empty, non-durable
    /// snapshot. It is never cached, so the next run reads the store again.
    fn committed_snapshot(&self, context: &mut RunContext) -> Result<LoadedState> {
        if let Some(snapshot) = &context.committed {
            return Ok(LoadedState {
                snapshot: snapshot.clone(),
                durable: true,
            });
        }

        match context.store.load() {
            Ok(snapshot) => Ok(LoadedState {
                snapshot: Self::cache_loaded(context, snapshot),
                durable: true,
            }),
            Err(e) if self.settings.fail_open => {
                tracing::warn!(
                    store = context.store.name(),
                    error = %e,
                    "State could not be loaded, continuing with an empty seen set"
                );
                Ok(LoadedState {
                    snapshot: PipelineSnapshot::default(),
                    durable: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Second read of a store that failed at the start of the run
    fn reload(context: &mut RunContext) -> Option<PipelineSnapshot> {
        match context.store.load() {
            Ok(snapshot) => Some(Self::cache_loaded(context, snapshot)),
            Err(e) => {
                tracing::debug!(store = context.store.name(), error = %e, "State still unreadable");
                None
            }
        }
    }

    fn cache_loaded(context: &mut RunContext, snapshot: PipelineSnapshot) -> PipelineSnapshot {
        tracing::info!(
            store = context.store.name(),
            seen = snapshot.seen.len(),
            days = snapshot.series.len(),
            "State loaded"
        );
        context.committed = Some(snapshot.clone());
        snapshot
    }

    async fn fetch(
        &self,
        adapter: &dyn IngestionAdapter,
        since: DateTime<Utc>,
    ) -> Result<FetchResult> {
        let result = with_retry_if(
            &self.settings.ingestion_retry,
            move || adapter.fetch(since),
            |e: &IngestError| {
                if e.is_transient() {
                    RetryDecision::Retry(e.retry_after())
                } else {
                    RetryDecision::Abort
                }
            },
        )
        .await;

        match result {
            Ok(documents) => {
                tracing::info!(
                    adapter = adapter.name(),
                    since = %since,
                    documents = documents.len(),
                    "Documents fetched"
                );
                Ok(FetchResult::Fetched(documents))
            }
            Err(e) if e.is_transient() => Ok(FetchResult::Skipped(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Dedup, match and absorb a fetched batch into a copy of `committed`
    async fn ingest(
        &self,
        context: &RunContext,
        committed: PipelineSnapshot,
        documents: Vec<Document>,
        report: &mut RunReport,
    ) -> Result<PipelineSnapshot> {
        let trigger = report.trigger;
        let mut next = committed;

        self.enter(PipelineState::Deduplicating)?;
        let dedup = next.seen.filter_new(documents);
        report.stats.fetched = dedup.total_checked;
        report.stats.duplicates = dedup.duplicates;
        report.stats.new_documents = dedup.new_count();
        metrics::record_dedup_results(dedup.total_checked, dedup.new_count());
        tracing::debug!(
            checked = dedup.total_checked,
            new = dedup.new_count(),
            ratio = dedup.dedup_ratio(),
            "Batch deduplicated"
        );

        self.enter(PipelineState::Matching)?;
        let matcher = Arc::clone(&context.matcher);
        let documents = dedup.new_documents;
        let (documents, matches) = tokio::task::spawn_blocking(move || {
            let matches = matcher.match_batch(&documents);
            (documents, matches)
        })
        .await
        .map_err(|e| Error::with_source("Matching task failed", e))?;

        self.enter(PipelineState::Aggregating)?;
        let records: Vec<MatchRecord> = matches.into_iter().flatten().collect();
        let matched: std::collections::HashSet<&str> =
            records.iter().map(|r| r.document_id.as_str()).collect();
        report.stats.matched_documents = matched.len();

        let mut per_keyword: BTreeMap<&str, u64> = BTreeMap::new();
        for record in &records {
            *per_keyword.entry(record.keyword.as_str()).or_default() += record.occurrence_count;
        }
        report.stats.occurrences = per_keyword.values().sum();

        let date = trigger.local_date(self.settings.utc_offset);
        next.series.absorb(date, &records)?;
        for document in &documents {
            next.seen.mark_seen(&document.id, trigger.at);
        }

        report.stats.seen_pruned = next.seen.prune(trigger.at, self.settings.seen_retention);
        let horizon = date - Duration::days(i64::from(self.settings.series_retention_days));
        report.stats.days_pruned = next.series.prune_before(horizon);

        next.last_fetch_at = Some(match next.last_fetch_at {
            Some(previous) => previous.max(trigger.at),
            None => trigger.at,
        });

        let occurrences: Vec<(&str, u64)> = per_keyword.into_iter().collect();
        metrics::record_matches(report.stats.matched_documents, &occurrences);

        Ok(next)
    }

    fn build_report(&self, context: &RunContext, snapshot: &PipelineSnapshot, trigger: Trigger) -> Report {
        let date = trigger.local_date(self.settings.utc_offset);
        let generated_at = Utc::now();

        match trigger.kind {
            TriggerKind::Weekly => {
                let window = ReportWindow::new(date - Duration::days(6), date);
                let totals = snapshot
                    .series
                    .totals(&context.keywords, window.start, window.end);
                let forecasts =
                    context
                        .forecaster
                        .forecast_all(&snapshot.series, &context.keywords, date);
                context
                    .assembler
                    .build_weekly(totals, forecasts, window, generated_at)
            }
            _ => {
                let aggregate = snapshot
                    .series
                    .aggregate(date)
                    .cloned()
                    .unwrap_or_else(|| DailyAggregate::new(date));
                context.assembler.build_daily(date, &aggregate, generated_at)
            }
        }
    }
}
