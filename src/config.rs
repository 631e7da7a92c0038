//! Pipeline configuration
//!
//! A single `PipelineConfig` value is built once per run (defaults, optional JSON
//! file, environment, CLI flags) and handed to every component explicitly.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Column names used by every cleaned master table.
pub const DATE_COLUMN: &str = "Date";
pub const STATE_COLUMN: &str = "State";
pub const DISTRICT_COLUMN: &str = "District";
pub const TOTAL_COLUMN: &str = "Total";

/// The three administrative-update sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Biometric,
    Enrolment,
    Demographic,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Biometric => "biometric",
            SourceKind::Enrolment => "enrolment",
            SourceKind::Demographic => "demographic",
        }
    }

    pub fn all() -> [SourceKind; 3] {
        [SourceKind::Biometric, SourceKind::Enrolment, SourceKind::Demographic]
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "biometric" | "bio" => Ok(SourceKind::Biometric),
            "enrolment" | "enrollment" => Ok(SourceKind::Enrolment),
            "demographic" | "demo" => Ok(SourceKind::Demographic),
            other => Err(PipelineError::Config(format!("unknown source '{}'", other))),
        }
    }
}

/// Layout of one raw source table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub kind: SourceKind,
    /// File name under `<data_dir>/raw/`
    pub raw_file: String,
    /// File name under `<data_dir>/processed/`
    pub master_file: String,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_state_column")]
    pub state_column: String,
    #[serde(default = "default_district_column")]
    pub district_column: String,
    pub metrics: Vec<String>,
    /// Sub-metric counted as "young" when computing child share.
    #[serde(default)]
    pub young_metric: Option<String>,
    /// Extra raw columns carried into the master table when present.
    #[serde(default)]
    pub passthrough: Vec<String>,
}

fn default_date_column() -> String {
    DATE_COLUMN.to_string()
}

fn default_state_column() -> String {
    STATE_COLUMN.to_string()
}

fn default_district_column() -> String {
    DISTRICT_COLUMN.to_string()
}

impl SourceSpec {
    pub fn new(kind: SourceKind, raw_file: &str, master_file: &str, metrics: &[&str]) -> Self {
        Self {
            kind,
            raw_file: raw_file.to_string(),
            master_file: master_file.to_string(),
            date_column: default_date_column(),
            state_column: default_state_column(),
            district_column: default_district_column(),
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            young_metric: None,
            passthrough: vec!["Pincode".to_string()],
        }
    }

    pub fn with_young_metric(mut self, metric: &str) -> Self {
        self.young_metric = Some(metric.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub sources: Vec<SourceSpec>,
    pub random_seed: u64,
    pub contamination: f64,
    pub similarity_cutoff: f64,
    pub max_duplicate_notes: usize,
    pub cluster_count: usize,
    pub cluster_initializations: usize,
    pub forecast_horizon: usize,
    pub seasonal_period: usize,
    pub train_fraction: f64,
    pub anomaly_source: SourceKind,
    pub cluster_source: SourceKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("outputs"),
            sources: vec![
                SourceSpec::new(
                    SourceKind::Biometric,
                    "aadhaar_biometric.csv",
                    "master_biometric.csv",
                    &["Bio_age_5_17", "Bio_age_17+"],
                )
                .with_young_metric("Bio_age_5_17"),
                SourceSpec::new(
                    SourceKind::Enrolment,
                    "aadhaar_enrolment.csv",
                    "master_enrolment.csv",
                    &["Age_0_5", "Age_5_17", "Age_18_greater"],
                )
                .with_young_metric("Age_5_17"),
                SourceSpec::new(
                    SourceKind::Demographic,
                    "aadhaar_demo_monthly_update.csv",
                    "master_demo.csv",
                    &["Demo_age_5_17", "Demo_age_17+"],
                )
                .with_young_metric("Demo_age_5_17"),
            ],
            random_seed: 42,
            contamination: 0.05,
            similarity_cutoff: 0.85,
            max_duplicate_notes: 3,
            cluster_count: 4,
            cluster_initializations: 10,
            forecast_horizon: 6,
            seasonal_period: 12,
            train_fraction: 0.8,
            anomaly_source: SourceKind::Biometric,
            cluster_source: SourceKind::Biometric,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PULSE_*` environment overrides.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(dir) = env::var("PULSE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("PULSE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(seed) = env::var("PULSE_SEED") {
            self.random_seed = seed
                .parse()
                .map_err(|_| PipelineError::Config(format!("PULSE_SEED is not a number: {}", seed)))?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.contamination) || self.contamination == 0.0 {
            return Err(PipelineError::Config(format!(
                "contamination must be in (0, 0.5), got {}",
                self.contamination
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_cutoff) {
            return Err(PipelineError::Config("similarity_cutoff must be in [0, 1]".into()));
        }
        if self.cluster_count == 0 || self.cluster_initializations == 0 {
            return Err(PipelineError::Config("cluster_count and cluster_initializations must be positive".into()));
        }
        if self.seasonal_period < 2 {
            return Err(PipelineError::Config("seasonal_period must be at least 2".into()));
        }
        if !(0.0..1.0).contains(&self.train_fraction) || self.train_fraction == 0.0 {
            return Err(PipelineError::Config("train_fraction must be in (0, 1)".into()));
        }
        Ok(())
    }

    pub fn source(&self, kind: SourceKind) -> Option<&SourceSpec> {
        self.sources.iter().find(|s| s.kind == kind)
    }

    pub fn raw_path(&self, spec: &SourceSpec) -> PathBuf {
        self.data_dir.join("raw").join(&spec.raw_file)
    }

    pub fn master_path(&self, spec: &SourceSpec) -> PathBuf {
        self.data_dir.join("processed").join(&spec.master_file)
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.data_dir.join("mappings").join("state_mapping.csv")
    }

    pub fn review_queue_path(&self) -> PathBuf {
        self.data_dir.join("mappings").join("unresolved_states.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.random_seed, 42);
        assert_eq!(config.sources.len(), 3);
        assert_eq!(
            config.source(SourceKind::Biometric).unwrap().young_metric.as_deref(),
            Some("Bio_age_5_17")
        );
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "random_seed": 7, "contamination": 0.1 }"#).unwrap();
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.cluster_count, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_contamination_rejected() {
        let config = PipelineConfig {
            contamination: 0.7,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("Demo".parse::<SourceKind>().unwrap(), SourceKind::Demographic);
        assert!("census".parse::<SourceKind>().is_err());
    }
}
