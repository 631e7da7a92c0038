//! Anomaly Scorer
//!
//! Per-entity z-scores over monthly totals, combined with an isolation forest
//! fitted on `(z, value)` across every entity-month.

use crate::aggregator::{aggregate_monthly, AggregationStats, MonthlySeries};
use crate::cleaner::CleanedTable;
use crate::config::{PipelineConfig, TOTAL_COLUMN};
use crate::error::{PipelineError, Result};
use crate::models::isolation_forest::{label_outliers, IsolationForest, IsolationForestParams};
use crate::models::stats;
use crate::time::Month;
use crate::types::Granularity;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Added to the standard deviation before dividing.
pub const Z_EPSILON: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyLabel {
    Normal,
    Outlier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "District")]
    pub district: String,
    #[serde(rename = "Month")]
    pub month: Month,
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "Mean")]
    pub mean: f64,
    #[serde(rename = "Std")]
    pub std: f64,
    #[serde(rename = "Z_Score")]
    pub z: f64,
    #[serde(rename = "Label")]
    pub label: AnomalyLabel,
}

impl AnomalyRecord {
    pub fn is_outlier(&self) -> bool {
        self.label == AnomalyLabel::Outlier
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyReport {
    pub records: Vec<AnomalyRecord>,
    pub threshold: f64,
    /// Row counts of the monthly aggregation that was scored
    pub aggregation: AggregationStats,
}

impl AnomalyReport {
    pub fn outlier_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_outlier()).count()
    }

    pub fn outlier_fraction(&self) -> f64 {
        if self.records.is_empty() {
            0.0
        } else {
            self.outlier_count() as f64 / self.records.len() as f64
        }
    }
}

pub struct AnomalyScorer {
    params: IsolationForestParams,
}

impl AnomalyScorer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            params: IsolationForestParams {
                contamination: config.contamination,
                seed: config.random_seed,
                ..IsolationForestParams::default()
            },
        }
    }

    /// Score every observation of a monthly series.
    pub fn score(&self, series: &MonthlySeries) -> Result<AnomalyReport> {
        let mut records = Vec::with_capacity(series.observation_count());
        for (key, months) in series.entities() {
            let values: Vec<f64> = months.values().copied().collect();
            let mean = stats::mean(&values).unwrap_or(0.0);
            // a lone observation has no spread; it scores z = 0
            let std = stats::sample_std(&values);
            for (month, value) in months {
                let z = match std {
                    Some(s) => (value - mean) / (s + Z_EPSILON),
                    None => 0.0,
                };
                records.push(AnomalyRecord {
                    state: key.state.clone(),
                    district: key.district_or_empty().to_string(),
                    month: *month,
                    value: *value,
                    mean,
                    std: std.unwrap_or(0.0),
                    z,
                    label: AnomalyLabel::Normal,
                });
            }
        }

        if records.len() < 2 {
            return Err(PipelineError::model_fit(
                "anomaly",
                format!("{} observations; at least 2 required", records.len()),
            ));
        }

        let features: Vec<Vec<f64>> = records.iter().map(|r| vec![r.z, r.value]).collect();
        let forest = IsolationForest::fit(&features, &self.params)?;
        let scores = forest.score_all(&features);
        let (threshold, labels) = label_outliers(&scores, self.params.contamination);
        for (record, outlier) in records.iter_mut().zip(labels) {
            if outlier {
                record.label = AnomalyLabel::Outlier;
                debug!("outlier {} / {} {}: {}", record.state, record.district, record.month, record.value);
            }
        }

        Ok(AnomalyReport {
            records,
            threshold,
            aggregation: AggregationStats::default(),
        })
    }
}

/// Score monthly `Total` per State+District of a cleaned table.
pub fn detect_anomalies(config: &PipelineConfig, table: &CleanedTable) -> Result<AnomalyReport> {
    let (series, aggregation) = aggregate_monthly(table, TOTAL_COLUMN, Granularity::District)?;
    let mut report = AnomalyScorer::new(config).score(&series)?;
    report.aggregation = aggregation;
    info!(
        "{}: {} of {} entity-months flagged as outliers (threshold {:.4})",
        table.source,
        report.outlier_count(),
        report.records.len(),
        report.threshold
    );
    Ok(report)
}
