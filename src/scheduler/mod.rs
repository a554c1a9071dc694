//! Time triggers for the daemon
//!
//! The pipeline itself only exposes tick entry points. This module works out
//! when the next fetch, daily and weekly ticks are due and drives the
//! orchestrator with them.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use legiswatch::config::ScheduleConfig;
//! use legiswatch::pipeline::TriggerKind;
//! use legiswatch::scheduler::TickSchedule;
//!
//! let schedule = TickSchedule::from_config(&ScheduleConfig::default()).unwrap();
//! let due = schedule.next_ticks(Utc.with_ymd_and_hms(2024, 3, 1, 17, 30, 0).unwrap());
//! assert_eq!(due.kinds, vec![TriggerKind::Daily]);
//! ```

pub mod trigger;

pub use trigger::{DueTicks, ScheduleTrigger, TickSchedule};
