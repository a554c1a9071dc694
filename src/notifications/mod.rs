//! Report notification
//!
//! Reports leave the pipeline through a [`NotificationDispatcher`]. The
//! [`DeliveryService`] wraps a dispatcher with bounded retries and parks
//! reports that fail every attempt in the [`Outbox`] for manual resend.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │      DeliveryService                       │
//! │  - Bounded retries with backoff            │
//! │  - Outbox fallback                         │
//! └────────────────────────────────────────────┘
//!                     │
//!             ┌───────┴───────┐
//!             ▼               ▼
//!       ┌─────────┐     ┌─────────┐
//!       │ Webhook │     │   Log   │
//!       │ Channel │     │ Channel │
//!       └─────────┘     └─────────┘
//! ```

pub mod channels;
mod manager;
pub mod outbox;

pub use channels::log::LogDispatcher;
pub use channels::webhook::{WebhookConfig, WebhookDispatcher};
pub use channels::{ChannelResult, DeliveryError, NotificationDispatcher};
pub use manager::{DeliveryOutcome, DeliveryService};
pub use outbox::{Outbox, OutboxEntry, ResendSummary};
