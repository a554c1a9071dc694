//! Keyword trend forecasting
//!
//! This module provides functionality for:
//! - Bucketing a daily series into complete periods (weeks by default)
//! - Fitting a least-squares line over the most recent periods
//! - Classifying the trend direction against a noise threshold
//! - Predicting the next period's count with a confidence score
//!
//! A keyword with too few complete periods is reported as
//! [`TrendDirection::InsufficientData`] and carries no slope or prediction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::aggregation::{AggregationEngine, TimeSeries};
use crate::matcher::KeywordSet;

/// Trend direction indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Relative slope above the noise threshold
    Rising,

    /// Relative slope below the negative noise threshold
    Falling,

    /// Change within the noise threshold
    Flat,

    /// Fewer complete periods than required
    InsufficientData,
}

impl TrendDirection {
    /// Classify a relative slope
    ///
    /// # Classification
    /// - `relative > threshold`: Rising
    /// - `relative < -threshold`: Falling
    /// - otherwise: Flat
    #[must_use]
    pub fn from_relative_slope(relative: f64, threshold: f64) -> Self {
        if relative > threshold {
            Self::Rising
        } else if relative < -threshold {
            Self::Falling
        } else {
            Self::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Flat => "flat",
            Self::InsufficientData => "insufficient_data",
        }
    }

    /// Rising or falling
    pub fn is_notable(&self) -> bool {
        matches!(self, Self::Rising | Self::Falling)
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forecast for one keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendForecast {
    pub keyword: String,
    pub direction: TrendDirection,

    /// Change in count per period
    pub slope: Option<f64>,

    /// Projected count for the period following the series
    pub predicted_next_period_count: Option<f64>,

    /// Goodness of fit scaled by sample size, in `[0, 1]`
    pub confidence: f64,

    /// Number of complete periods the fit used
    pub periods_used: usize,
}

impl TrendForecast {
    /// Forecast with no numeric prediction
    #[must_use]
    pub fn insufficient(keyword: impl Into<String>, periods_used: usize) -> Self {
        Self {
            keyword: keyword.into(),
            direction: TrendDirection::InsufficientData,
            slope: None,
            predicted_next_period_count: None,
            confidence: 0.0,
            periods_used,
        }
    }
}

/// Forecasting parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Minimum number of complete periods needed for a numeric forecast
    pub min_forecast_periods: usize,

    /// Maximum number of recent periods used for the fit
    pub window_periods: usize,

    /// Days per period
    pub period_days: u32,

    /// Relative slope below which a trend is flat
    pub noise_threshold: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_forecast_periods: 4,
            window_periods: 8,
            period_days: 7,
            noise_threshold: 0.05,
        }
    }
}

impl ForecastConfig {
    /// Days of history needed to fill the window
    #[must_use]
    pub fn history_days(&self) -> u32 {
        self.period_days
            .saturating_mul(u32::try_from(self.window_periods).unwrap_or(u32::MAX))
    }
}

/// Sum a daily series into complete periods aligned to its last day
///
/// Leading days that do not fill a whole period are dropped.
#[must_use]
pub fn period_totals(series: &TimeSeries, period_days: u32) -> Vec<u64> {
    let period = period_days.max(1) as usize;
    let counts = series.occurrences();
    let complete = counts.len() / period;
    let skip = counts.len() - complete * period;

    counts[skip..]
        .chunks_exact(period)
        .map(|chunk| chunk.iter().sum())
        .collect()
}

/// A strategy turning a keyword's history into a forecast
pub trait ForecastModel: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Forecast the period following `history`
    fn forecast(&self, keyword: &str, history: &TimeSeries) -> TrendForecast;
}

/// Ordinary least-squares trend over period totals
#[derive(Debug, Clone, Default)]
pub struct LinearTrendModel {
    config: ForecastConfig,
}

impl LinearTrendModel {
    #[must_use]
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// Fit the line over `totals`, which must hold at least two values
    fn fit(&self, keyword: &str, totals: &[f64]) -> TrendForecast {
        let n = totals.len();
        let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();

        let mean_x = xs.iter().mean();
        let mean_y = totals.iter().mean();
        let var_x = xs.iter().population_variance();
        let cov_xy = xs.iter().population_covariance(totals.iter());

        let slope = cov_xy / var_x;
        let intercept = mean_y - slope * mean_x;
        let predicted = (intercept + slope * n as f64).max(0.0);

        let ss_tot = totals.iter().population_variance() * n as f64;
        let ss_res: f64 = xs
            .iter()
            .zip(totals)
            .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
            .sum();
        let r_squared = if ss_tot <= f64::EPSILON {
            1.0
        } else {
            (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
        };
        let confidence = r_squared * n as f64 / (n as f64 + 2.0);

        let relative = slope / mean_y.max(1.0);
        let direction = TrendDirection::from_relative_slope(relative, self.config.noise_threshold);

        TrendForecast {
            keyword: keyword.to_string(),
            direction,
            slope: Some(slope),
            predicted_next_period_count: Some(predicted),
            confidence,
            periods_used: n,
        }
    }
}

impl ForecastModel for LinearTrendModel {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn forecast(&self, keyword: &str, history: &TimeSeries) -> TrendForecast {
        let totals = period_totals(history, self.config.period_days);
        let window = self.config.window_periods.max(1);
        let recent = &totals[totals.len().saturating_sub(window)..];

        if recent.len() < self.config.min_forecast_periods.max(2) {
            return TrendForecast::insufficient(keyword, recent.len());
        }

        let values: Vec<f64> = recent.iter().map(|&v| v as f64).collect();
        self.fit(keyword, &values)
    }
}

/// Forecasts every keyword of a set from the aggregate series
pub struct ForecastEngine {
    model: Box<dyn ForecastModel>,
    config: ForecastConfig,
}

impl ForecastEngine {
    /// Engine backed by the linear trend model
    #[must_use]
    pub fn new(config: ForecastConfig) -> Self {
        Self {
            model: Box::new(LinearTrendModel::new(config)),
            config,
        }
    }

    /// Engine backed by a custom model
    #[must_use]
    pub fn with_model(config: ForecastConfig, model: Box<dyn ForecastModel>) -> Self {
        Self { model, config }
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Forecast one keyword
    pub fn forecast(&self, keyword: &str, history: &TimeSeries) -> TrendForecast {
        self.model.forecast(keyword, history)
    }

    /// Forecast each keyword from its history ending at `as_of`
    pub fn forecast_all(
        &self,
        aggregation: &AggregationEngine,
        keywords: &KeywordSet,
        as_of: NaiveDate,
    ) -> Vec<TrendForecast> {
        let days = self.config.history_days();
        keywords
            .iter()
            .map(|keyword| {
                let history = aggregation.history(keyword.text(), days, as_of);
                let forecast = self.forecast(keyword.text(), &history);
                tracing::debug!(
                    keyword = keyword.text(),
                    model = self.model.name(),
                    direction = %forecast.direction,
                    periods = forecast.periods_used,
                    "Forecast computed"
                );
                forecast
            })
            .collect()
    }
}

impl std::fmt::Debug for ForecastEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastEngine")
            .field("model", &self.model.name())
            .field("config", &self.config)
            .finish()
    }
}
