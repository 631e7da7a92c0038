//! Analytics over cleaned master tables. Each analytic is independent and
//! reads the tables without modifying them.

pub mod anomaly;
pub mod clustering;
pub mod forecasting;
pub mod profile;

pub use anomaly::{detect_anomalies, AnomalyLabel, AnomalyRecord, AnomalyReport, AnomalyScorer};
pub use clustering::{cluster_entities, ClusterAssignment, ClusterSummary, ClusteringResult};
pub use forecasting::{forecast_source, ForecastPoint, ForecastSeries, ForecastStatus, ForecastSummary, Forecaster};
pub use profile::{profile_table, SourceProfile};
