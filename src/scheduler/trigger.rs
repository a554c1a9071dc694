//! Tick calculation and the daemon trigger loop
//!
//! Fetch ticks are aligned to multiples of the fetch interval since the Unix
//! epoch. Daily ticks fire at the report time in the configured offset, and
//! weekly ticks at the same time on the report day. When a report tick is due
//! the fetch tick at the same instant is dropped, since every report run
//! fetches first.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Utc, Weekday};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::{ConfigError, ScheduleConfig};
use crate::pipeline::{Orchestrator, Trigger, TriggerKind};

// ============================================================================
// Tick Schedule
// ============================================================================

/// Computes when each trigger kind is next due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSchedule {
    fetch_interval: Duration,
    report_time: NaiveTime,
    weekly_day: Weekday,
    offset: FixedOffset,
}

/// Triggers due at the same instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTicks {
    pub at: DateTime<Utc>,
    pub kinds: Vec<TriggerKind>,
}

impl DueTicks {
    pub fn triggers(&self) -> impl Iterator<Item = Trigger> + '_ {
        self.kinds.iter().map(|kind| Trigger::new(*kind, self.at))
    }
}

impl TickSchedule {
    pub fn new(
        fetch_interval: Duration,
        report_time: NaiveTime,
        weekly_day: Weekday,
        offset: FixedOffset,
    ) -> Self {
        Self {
            fetch_interval: fetch_interval.max(Duration::minutes(1)),
            report_time,
            weekly_day,
            offset,
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        if config.fetch_interval_minutes == 0 {
            return Err(ConfigError::invalid(
                "schedule.fetch_interval_minutes",
                "must be greater than 0",
            ));
        }

        Ok(Self::new(
            Duration::minutes(i64::from(config.fetch_interval_minutes)),
            config.report_time()?,
            config.report_weekday()?,
            config.utc_offset()?,
        ))
    }

    /// First fetch tick strictly after `after`
    pub fn next_fetch(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let interval = self.fetch_interval.num_seconds();
        let next = (after.timestamp().div_euclid(interval) + 1) * interval;
        DateTime::from_timestamp(next, 0).unwrap_or(after + self.fetch_interval)
    }

    /// First daily tick strictly after `after`
    pub fn next_daily(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let local_date = after.with_timezone(&self.offset).date_naive();
        let candidate = self.to_utc(local_date.and_time(self.report_time));
        if candidate > after {
            candidate
        } else {
            candidate + Duration::days(1)
        }
    }

    /// First weekly tick strictly after `after`
    pub fn next_weekly(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let mut tick = self.next_daily(after);
        while tick.with_timezone(&self.offset).weekday() != self.weekly_day {
            tick += Duration::days(1);
        }
        tick
    }

    /// Earliest instant after `after` with the triggers due then
    pub fn next_ticks(&self, after: DateTime<Utc>) -> DueTicks {
        let candidates = [
            (TriggerKind::Fetch, self.next_fetch(after)),
            (TriggerKind::Daily, self.next_daily(after)),
            (TriggerKind::Weekly, self.next_weekly(after)),
        ];

        let at = candidates
            .iter()
            .map(|(_, at)| *at)
            .min()
            .unwrap_or(after + self.fetch_interval);

        let mut kinds: Vec<TriggerKind> = candidates
            .iter()
            .filter(|(_, due)| *due == at)
            .map(|(kind, _)| *kind)
            .collect();
        if kinds.iter().any(TriggerKind::reports) {
            kinds.retain(|kind| kind.reports());
        }

        DueTicks { at, kinds }
    }

    fn to_utc(&self, local: chrono::NaiveDateTime) -> DateTime<Utc> {
        (local - Duration::seconds(i64::from(self.offset.local_minus_utc()))).and_utc()
    }
}

// ============================================================================
// Schedule Trigger
// ============================================================================

/// Sleeps until each due tick and submits it to the orchestrator
pub struct ScheduleTrigger {
    schedule: TickSchedule,
    orchestrator: Arc<Orchestrator>,
}

impl ScheduleTrigger {
    pub fn new(schedule: TickSchedule, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            schedule,
            orchestrator,
        }
    }

    /// Run until `shutdown` turns true, returning the number of ticks handled
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut handled = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let due = self.schedule.next_ticks(Utc::now());
            let wait = (due.at - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tracing::debug!(at = %due.at, kinds = ?due.kinds, "Next tick scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            for trigger in due.triggers() {
                for report in self.orchestrator.submit(trigger).await {
                    tracing::debug!(
                        trigger = %report.trigger.kind,
                        outcome = report.outcome.as_str(),
                        "Tick handled"
                    );
                }
                handled += 1;
            }
        }

        tracing::info!(ticks = handled, "Schedule trigger stopped");
        handled
    }
}

// ============================================================================
// Tests
// ============================================================================
