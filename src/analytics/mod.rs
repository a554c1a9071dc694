//! Time-series aggregation and trend forecasting

pub mod aggregation;
pub mod keyword_trends;

pub use aggregation::{
    AggregationEngine, AggregationError, DailyAggregate, DataPoint, KeywordTally, KeywordTotals,
    TimeSeries,
};
pub use keyword_trends::{
    period_totals, ForecastConfig, ForecastEngine, ForecastModel, LinearTrendModel,
    TrendDirection, TrendForecast,
};
