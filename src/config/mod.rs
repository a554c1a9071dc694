//! Configuration management for legiswatch
//!
//! Configuration is read from a TOML file, overridden by `LEGISWATCH_*`
//! environment variables and validated once at start-up. The resulting
//! [`Config`] is immutable; components receive the sections they need at
//! construction.

use chrono::{FixedOffset, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::analytics::ForecastConfig;
use crate::error::{ErrorCategory, LegiswatchErrorTrait};
use crate::ingest::HttpAdapterConfig;
use crate::matcher::{KeywordSet, MatchConfigError, MatchOptions};
use crate::storage::StorageBackend;
use crate::utils::retry::RetryConfig;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error(transparent)]
    Keywords(#[from] MatchConfigError),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl LegiswatchErrorTrait for ConfigError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Config
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watched keywords and match options
    pub monitor: MonitorConfig,

    /// Trigger times
    pub schedule: ScheduleConfig,

    /// Trend forecasting parameters
    pub forecast: ForecastConfig,

    /// Source API settings
    pub ingestion: IngestionConfig,

    /// Report delivery settings
    pub notification: NotificationConfig,

    /// Persisted state settings
    pub storage: StorageConfig,

    /// Prometheus endpoint
    pub metrics: MetricsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Watched keywords
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub keywords: Vec<String>,

    /// Optional file with one keyword per line, appended to `keywords`
    pub keyword_file: Option<PathBuf>,

    pub case_sensitive: bool,
    pub match_whole_word: bool,
    pub min_keyword_length: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            keyword_file: None,
            case_sensitive: false,
            match_whole_word: false,
            min_keyword_length: 1,
        }
    }
}

impl MonitorConfig {
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: self.case_sensitive,
            whole_word: self.match_whole_word,
            min_keyword_length: self.min_keyword_length,
        }
    }

    /// Load and normalize the keyword set
    pub fn keyword_set(&self) -> Result<KeywordSet, ConfigError> {
        let mut raw = self.keywords.clone();
        if let Some(path) = &self.keyword_file {
            raw.extend(KeywordSet::read_file(path)?);
        }
        Ok(KeywordSet::new(raw, &self.match_options())?)
    }
}

/// Trigger times, interpreted at `utc_offset_minutes` from UTC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub fetch_interval_minutes: u32,

    /// Local time of the daily (and weekly) report, `HH:MM`
    pub daily_report_time: String,

    /// Day of the weekly report, e.g. `sunday` or `sun`
    pub weekly_report_day: String,

    pub utc_offset_minutes: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fetch_interval_minutes: 60,
            daily_report_time: "18:00".to_string(),
            weekly_report_day: "sunday".to_string(),
            utc_offset_minutes: 0,
        }
    }
}

impl ScheduleConfig {
    pub fn report_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.daily_report_time, "%H:%M").map_err(|_| {
            ConfigError::invalid(
                "schedule.daily_report_time",
                format!("'{}' is not a HH:MM time", self.daily_report_time),
            )
        })
    }

    pub fn report_weekday(&self) -> Result<Weekday, ConfigError> {
        self.weekly_report_day.trim().parse::<Weekday>().map_err(|_| {
            ConfigError::invalid(
                "schedule.weekly_report_day",
                format!("'{}' is not a day of the week", self.weekly_report_day),
            )
        })
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .filter(|secs| secs.abs() <= 14 * 3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ConfigError::invalid(
                    "schedule.utc_offset_minutes",
                    format!("{} is outside -840..=840", self.utc_offset_minutes),
                )
            })
    }
}

/// Source API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub api_base_url: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub page_limit: u32,

    /// Most pages requested per fetch window
    pub max_pages: u32,

    /// How far back the first fetch reaches when no watermark exists
    pub initial_lookback_hours: u32,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        let adapter = HttpAdapterConfig::default();
        Self {
            api_base_url: adapter.base_url,
            endpoint: adapter.endpoint,
            timeout_secs: adapter.timeout.as_secs(),
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            page_limit: adapter.page_limit,
            max_pages: adapter.max_pages,
            initial_lookback_hours: 24,
        }
    }
}

impl IngestionConfig {
    pub fn adapter_config(&self) -> HttpAdapterConfig {
        HttpAdapterConfig {
            base_url: self.api_base_url.clone(),
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            page_limit: self.page_limit,
            max_pages: self.max_pages,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(self.max_retries, self.base_delay_ms, self.max_delay_ms)
    }

    pub fn initial_lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.initial_lookback_hours))
    }
}

/// Report delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub recipients: Vec<String>,

    /// Reports are logged instead of posted when unset
    pub webhook_url: Option<String>,

    pub webhook_auth_token: Option<String>,
    pub max_attempts: u32,
    pub outbox_dir: PathBuf,
    pub max_keywords_in_report: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            webhook_url: None,
            webhook_auth_token: None,
            max_attempts: 3,
            outbox_dir: PathBuf::from("data/outbox"),
            max_keywords_in_report: 20,
        }
    }
}

/// Persisted state settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
    pub seen_retention_days: u32,
    pub series_retention_days: u32,

    /// Continue with empty state when the store cannot be read
    pub fail_open: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("data/state.db"),
            seen_retention_days: 90,
            series_retention_days: 365,
            fail_open: false,
        }
    }
}

/// Prometheus endpoint, disabled when `listen_addr` is unset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub listen_addr: Option<SocketAddr>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` (or defaults), apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LEGISWATCH_*` environment overrides
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(keywords) = lookup("LEGISWATCH_KEYWORDS") {
            self.monitor.keywords = keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(url) = lookup("LEGISWATCH_API_BASE_URL") {
            self.ingestion.api_base_url = url;
        }
        if let Some(url) = lookup("LEGISWATCH_WEBHOOK_URL") {
            self.notification.webhook_url = Some(url);
        }
        if let Some(token) = lookup("LEGISWATCH_WEBHOOK_TOKEN") {
            self.notification.webhook_auth_token = Some(token);
        }
        if let Some(backend) = lookup("LEGISWATCH_STORAGE_BACKEND") {
            self.storage.backend = backend
                .parse()
                .map_err(|reason: String| ConfigError::invalid("storage.backend", reason))?;
        }
        if let Some(path) = lookup("LEGISWATCH_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(addr) = lookup("LEGISWATCH_METRICS_ADDR") {
            let addr = addr.parse().map_err(|e| {
                ConfigError::invalid("metrics.listen_addr", format!("'{addr}': {e}"))
            })?;
            self.metrics.listen_addr = Some(addr);
        }
        if let Some(level) = lookup("LEGISWATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LEGISWATCH_LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.monitor.keyword_set()?;

        if self.schedule.fetch_interval_minutes == 0 {
            return Err(ConfigError::invalid(
                "schedule.fetch_interval_minutes",
                "must be greater than 0",
            ));
        }
        self.schedule.report_time()?;
        self.schedule.report_weekday()?;
        self.schedule.utc_offset()?;

        if self.forecast.period_days == 0 {
            return Err(ConfigError::invalid("forecast.period_days", "must be greater than 0"));
        }
        if self.forecast.window_periods < self.forecast.min_forecast_periods {
            return Err(ConfigError::invalid(
                "forecast.window_periods",
                "must be at least min_forecast_periods",
            ));
        }
        if !self.forecast.noise_threshold.is_finite() || self.forecast.noise_threshold < 0.0 {
            return Err(ConfigError::invalid(
                "forecast.noise_threshold",
                "must be a non-negative number",
            ));
        }

        let adapter = self.ingestion.adapter_config();
        url::Url::parse(&adapter.base_url).map_err(|e| {
            ConfigError::invalid("ingestion.api_base_url", format!("'{}': {e}", adapter.base_url))
        })?;
        if self.ingestion.timeout_secs == 0 {
            return Err(ConfigError::invalid("ingestion.timeout_secs", "must be greater than 0"));
        }
        if self.ingestion.page_limit == 0 {
            return Err(ConfigError::invalid("ingestion.page_limit", "must be greater than 0"));
        }
        if self.ingestion.max_pages == 0 {
            return Err(ConfigError::invalid("ingestion.max_pages", "must be greater than 0"));
        }
        if self.ingestion.base_delay_ms > self.ingestion.max_delay_ms {
            return Err(ConfigError::invalid(
                "ingestion.base_delay_ms",
                "must not exceed max_delay_ms",
            ));
        }

        if let Some(webhook) = &self.notification.webhook_url {
            url::Url::parse(webhook).map_err(|e| {
                ConfigError::invalid("notification.webhook_url", format!("'{webhook}': {e}"))
            })?;
        }
        if self.notification.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "notification.max_attempts",
                "must be greater than 0",
            ));
        }
        if self.notification.max_keywords_in_report == 0 {
            return Err(ConfigError::invalid(
                "notification.max_keywords_in_report",
                "must be greater than 0",
            ));
        }

        if self.storage.seen_retention_days == 0 {
            return Err(ConfigError::invalid(
                "storage.seen_retention_days",
                "must be greater than 0",
            ));
        }
        if self.storage.series_retention_days < self.forecast.history_days() {
            return Err(ConfigError::invalid(
                "storage.series_retention_days",
                format!(
                    "must cover the forecast window of {} days",
                    self.forecast.history_days()
                ),
            ));
        }

        if !matches!(self.logging.format.as_str(), "text" | "pretty" | "json") {
            return Err(ConfigError::invalid(
                "logging.format",
                format!("'{}' is not one of text, json", self.logging.format),
            ));
        }

        Ok(())
    }
}
