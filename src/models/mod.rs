//! Numeric models used by the analytics: descriptive statistics, isolation
//! forest, k-means and Holt-Winters.

pub mod holt_winters;
pub mod isolation_forest;
pub mod kmeans;
pub mod stats;

pub use holt_winters::{HoltWinters, SmoothingParams};
pub use isolation_forest::{IsolationForest, IsolationForestParams};
pub use kmeans::{KMeansModel, KMeansParams, StandardScaler};
