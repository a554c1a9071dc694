//! Integration tests module
//!
//! End-to-end tests for the monitoring pipeline:
//! - Fetch, dedup, match and aggregate through the orchestrator
//! - Report triggers, forecasts and delivery
//! - HTTP ingestion against a mock API
//! - Failure handling and state consistency

pub mod error_scenarios;
pub mod fixtures;
pub mod http_pipeline_test;
pub mod pipeline_test;
