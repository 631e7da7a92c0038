//! Forecaster
//!
//! Seasonal Holt-Winters projection of the pan-region monthly total of one
//! source. Short or unfittable histories still produce a historical series.

use crate::aggregator::{densify, has_seasonal_history, monthly_totals, AggregationStats};
use crate::cleaner::CleanedTable;
use crate::config::{PipelineConfig, TOTAL_COLUMN};
use crate::error::Result;
use crate::models::holt_winters::{HoltWinters, SmoothingParams};
use crate::models::stats;
use crate::time::Month;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastStatus {
    Ok,
    InsufficientHistory,
    ModelFailed,
}

/// Row label in the per-metric forecast artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesLabel {
    History,
    Train,
    Test,
    Forecast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    #[serde(rename = "Month")]
    pub month: Month,
    #[serde(rename = "Series")]
    pub series: SeriesLabel,
    #[serde(rename = "Value")]
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct ForecastSeries {
    pub metric: String,
    /// Dense monthly history, zero-filled between first and last month
    pub history: Vec<(Month, f64)>,
    pub train_len: usize,
    pub forecast: Vec<(Month, f64)>,
    pub rmse: Option<f64>,
    pub params: Option<SmoothingParams>,
    pub status: ForecastStatus,
    pub detail: Option<String>,
    /// Row counts of the monthly aggregation behind `history`
    pub aggregation: AggregationStats,
}

impl ForecastSeries {
    fn historical(metric: &str, history: Vec<(Month, f64)>, status: ForecastStatus, detail: Option<String>) -> Self {
        Self {
            metric: metric.to_string(),
            history,
            train_len: 0,
            forecast: Vec::new(),
            rmse: None,
            params: None,
            status,
            detail,
            aggregation: AggregationStats::default(),
        }
    }

    pub fn train(&self) -> &[(Month, f64)] {
        &self.history[..self.train_len.min(self.history.len())]
    }

    pub fn test(&self) -> &[(Month, f64)] {
        &self.history[self.train_len.min(self.history.len())..]
    }

    /// Rows of the forecast artifact.
    pub fn points(&self) -> Vec<ForecastPoint> {
        let split = self.status == ForecastStatus::Ok;
        let mut points: Vec<ForecastPoint> = self
            .history
            .iter()
            .enumerate()
            .map(|(idx, (month, value))| ForecastPoint {
                month: *month,
                series: match (split, idx < self.train_len) {
                    (false, _) => SeriesLabel::History,
                    (true, true) => SeriesLabel::Train,
                    (true, false) => SeriesLabel::Test,
                },
                value: *value,
            })
            .collect();
        points.extend(self.forecast.iter().map(|(month, value)| ForecastPoint {
            month: *month,
            series: SeriesLabel::Forecast,
            value: *value,
        }));
        points
    }

    pub fn summary(&self) -> ForecastSummary {
        ForecastSummary {
            metric: self.metric.clone(),
            status: self.status,
            history_months: self.history.len(),
            train_months: self.train_len,
            test_months: if self.status == ForecastStatus::Ok { self.test().len() } else { 0 },
            forecast_months: self.forecast.len(),
            rmse: self.rmse,
            alpha: self.params.map(|p| p.alpha),
            beta: self.params.map(|p| p.beta),
            gamma: self.params.map(|p| p.gamma),
            detail: self.detail.clone().unwrap_or_default(),
        }
    }
}

/// One row of `forecast_summary.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    #[serde(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Status")]
    pub status: ForecastStatus,
    #[serde(rename = "History_Months")]
    pub history_months: usize,
    #[serde(rename = "Train_Months")]
    pub train_months: usize,
    #[serde(rename = "Test_Months")]
    pub test_months: usize,
    #[serde(rename = "Forecast_Months")]
    pub forecast_months: usize,
    #[serde(rename = "RMSE")]
    pub rmse: Option<f64>,
    #[serde(rename = "Alpha")]
    pub alpha: Option<f64>,
    #[serde(rename = "Beta")]
    pub beta: Option<f64>,
    #[serde(rename = "Gamma")]
    pub gamma: Option<f64>,
    #[serde(rename = "Detail")]
    pub detail: String,
}

pub struct Forecaster {
    period: usize,
    horizon: usize,
    train_fraction: f64,
}

impl Forecaster {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            period: config.seasonal_period,
            horizon: config.forecast_horizon,
            train_fraction: config.train_fraction,
        }
    }

    /// Forecast a dense monthly series. Failures are carried in the status.
    pub fn forecast(&self, metric: &str, history: Vec<(Month, f64)>) -> ForecastSeries {
        if !has_seasonal_history(history.len()) {
            info!(
                "{}: {} months of history, skipping seasonal model",
                metric,
                history.len()
            );
            return ForecastSeries::historical(
                metric,
                history,
                ForecastStatus::InsufficientHistory,
                None,
            );
        }

        let train_len = (history.len() as f64 * self.train_fraction).floor() as usize;
        let train: Vec<f64> = history[..train_len].iter().map(|(_, v)| *v).collect();
        let test: Vec<f64> = history[train_len..].iter().map(|(_, v)| *v).collect();

        let fitted = HoltWinters::fit(&train, self.period)
            .and_then(|model| model.forecast(test.len() + self.horizon).map(|f| (model, f)));
        let (model, values) = match fitted {
            Ok(ok) => ok,
            Err(e) => {
                warn!("{}: forecast failed: {}", metric, e);
                return ForecastSeries::historical(
                    metric,
                    history,
                    ForecastStatus::ModelFailed,
                    Some(e.to_string()),
                );
            }
        };

        let rmse = if test.is_empty() {
            0.0
        } else {
            stats::rmse(&test, &values[..test.len()]).unwrap_or(0.0)
        };
        let last_train = history[train_len - 1].0;
        let forecast = values
            .into_iter()
            .enumerate()
            .map(|(h, v)| (last_train.plus(h as u32 + 1), v))
            .collect();

        info!("{}: fitted on {} months, test RMSE {:.2}", metric, train_len, rmse);
        ForecastSeries {
            metric: metric.to_string(),
            history,
            train_len,
            forecast,
            rmse: Some(rmse),
            params: Some(model.params),
            status: ForecastStatus::Ok,
            detail: None,
            aggregation: AggregationStats::default(),
        }
    }
}

/// Forecast the pan-region monthly `Total` of a cleaned table.
pub fn forecast_source(config: &PipelineConfig, table: &CleanedTable) -> Result<ForecastSeries> {
    let (totals, aggregation) = monthly_totals(table, TOTAL_COLUMN)?;
    let mut series = Forecaster::new(config).forecast(table.source.as_str(), densify(&totals));
    series.aggregation = aggregation;
    Ok(series)
}
