//! Artifact store
//!
//! Fixed artifact locations, CSV/JSON writers, and loaders for presentation
//! layers. Loaders return `Ok(None)` when an artifact has not been produced.

use crate::analytics::{
    AnomalyRecord, ClusterAssignment, ClusterSummary, ForecastPoint, ForecastSeries,
    ForecastSummary, SourceProfile,
};
use crate::config::{PipelineConfig, SourceKind, STATE_COLUMN, TOTAL_COLUMN};
use crate::error::Result;
use crate::report::RunReport;
use crate::resolver::{NameMapping, ReviewEntry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Paths of every artifact a run can produce.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    mapping: PathBuf,
    review_queue: PathBuf,
    output_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            mapping: config.mapping_path(),
            review_queue: config.review_queue_path(),
            output_dir: config.output_dir.clone(),
        }
    }

    pub fn mapping(&self) -> PathBuf {
        self.mapping.clone()
    }

    pub fn review_queue(&self) -> PathBuf {
        self.review_queue.clone()
    }

    pub fn anomalies(&self) -> PathBuf {
        self.output_dir.join("anomalies_detected.csv")
    }

    pub fn clusters(&self) -> PathBuf {
        self.output_dir.join("district_clusters.csv")
    }

    pub fn cluster_summary(&self) -> PathBuf {
        self.output_dir.join("cluster_summary.csv")
    }

    pub fn forecast(&self, metric: &str) -> PathBuf {
        self.output_dir.join(format!("forecast_{}.csv", metric))
    }

    pub fn forecast_summary(&self) -> PathBuf {
        self.output_dir.join("forecast_summary.csv")
    }

    pub fn state_stats(&self, source: SourceKind) -> PathBuf {
        self.output_dir.join(format!("state_wise_stats_{}.csv", source))
    }

    pub fn profile(&self, source: SourceKind) -> PathBuf {
        self.output_dir.join(format!("profile_{}.json", source))
    }

    pub fn run_report(&self) -> PathBuf {
        self.output_dir.join("run_report.json")
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Serialize rows with their serde names as the header. An empty slice writes
/// only `empty_header`.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T], empty_header: &[&str]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        writer.write_record(empty_header)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    debug!("wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(Some(rows))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&text)?))
}

const ANOMALY_HEADER: [&str; 8] = ["State", "District", "Month", "Value", "Mean", "Std", "Z_Score", "Label"];
const CLUSTER_HEADER: [&str; 5] = ["State", "District", "Volume", "ChildShare", "Cluster"];
const CLUSTER_SUMMARY_HEADER: [&str; 4] = ["Cluster", "Count", "Mean_Volume", "Mean_ChildShare"];
const FORECAST_HEADER: [&str; 3] = ["Month", "Series", "Value"];
const FORECAST_SUMMARY_HEADER: [&str; 11] = [
    "Metric",
    "Status",
    "History_Months",
    "Train_Months",
    "Test_Months",
    "Forecast_Months",
    "RMSE",
    "Alpha",
    "Beta",
    "Gamma",
    "Detail",
];

pub fn write_anomalies(path: &Path, records: &[AnomalyRecord]) -> Result<()> {
    write_rows(path, records, &ANOMALY_HEADER)
}

pub fn write_clusters(paths: &ArtifactPaths, assignments: &[ClusterAssignment], summaries: &[ClusterSummary]) -> Result<()> {
    write_rows(&paths.clusters(), assignments, &CLUSTER_HEADER)?;
    write_rows(&paths.cluster_summary(), summaries, &CLUSTER_SUMMARY_HEADER)
}

pub fn write_forecast(paths: &ArtifactPaths, series: &ForecastSeries) -> Result<PathBuf> {
    let path = paths.forecast(&series.metric);
    write_rows(&path, &series.points(), &FORECAST_HEADER)?;
    Ok(path)
}

pub fn write_forecast_summary(path: &Path, rows: &[ForecastSummary]) -> Result<()> {
    write_rows(path, rows, &FORECAST_SUMMARY_HEADER)
}

/// `state_wise_stats_<source>.csv`: State, one column per metric, Total.
pub fn write_state_stats(path: &Path, profile: &SourceProfile) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec![STATE_COLUMN.to_string()];
    header.extend(profile.metrics.iter().cloned());
    header.push(TOTAL_COLUMN.to_string());
    writer.write_record(&header)?;
    for row in &profile.state_totals {
        let mut record = vec![row.state.clone()];
        record.extend(row.values.iter().map(|v| v.to_string()));
        record.push(row.total.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_profile(paths: &ArtifactPaths, source: SourceKind, profile: &SourceProfile) -> Result<()> {
    write_state_stats(&paths.state_stats(source), profile)?;
    write_json(&paths.profile(source), profile)
}

pub fn load_mapping(paths: &ArtifactPaths) -> Result<Option<NameMapping>> {
    let path = paths.mapping();
    if !path.exists() {
        return Ok(None);
    }
    NameMapping::load(&path).map(Some)
}

pub fn load_review_queue(paths: &ArtifactPaths) -> Result<Option<Vec<ReviewEntry>>> {
    read_rows(&paths.review_queue())
}

pub fn load_anomalies(paths: &ArtifactPaths) -> Result<Option<Vec<AnomalyRecord>>> {
    read_rows(&paths.anomalies())
}

pub fn load_clusters(paths: &ArtifactPaths) -> Result<Option<Vec<ClusterAssignment>>> {
    read_rows(&paths.clusters())
}

pub fn load_cluster_summary(paths: &ArtifactPaths) -> Result<Option<Vec<ClusterSummary>>> {
    read_rows(&paths.cluster_summary())
}

pub fn load_forecast(paths: &ArtifactPaths, metric: &str) -> Result<Option<Vec<ForecastPoint>>> {
    read_rows(&paths.forecast(metric))
}

pub fn load_forecast_summary(paths: &ArtifactPaths) -> Result<Option<Vec<ForecastSummary>>> {
    read_rows(&paths.forecast_summary())
}

pub fn load_profile(paths: &ArtifactPaths, source: SourceKind) -> Result<Option<SourceProfile>> {
    read_json(&paths.profile(source))
}

pub fn load_run_report(paths: &ArtifactPaths) -> Result<Option<RunReport>> {
    read_json(&paths.run_report())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::AnomalyLabel;
    use crate::time::Month;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> ArtifactPaths {
        let config = PipelineConfig {
            data_dir: dir.path().join("data"),
            output_dir: dir.path().join("outputs"),
            ..PipelineConfig::default()
        };
        ArtifactPaths::new(&config)
    }

    #[test]
    fn test_mapping_paths_follow_config() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            data_dir: dir.path().join("elsewhere"),
            ..PipelineConfig::default()
        };
        let p = ArtifactPaths::new(&config);
        assert_eq!(p.mapping(), config.mapping_path());
        assert_eq!(p.review_queue(), config.review_queue_path());
    }

    #[test]
    fn test_absent_artifacts_load_as_none() {
        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        assert!(load_mapping(&p).unwrap().is_none());
        assert!(load_anomalies(&p).unwrap().is_none());
        assert!(load_clusters(&p).unwrap().is_none());
        assert!(load_forecast(&p, "biometric").unwrap().is_none());
        assert!(load_profile(&p, SourceKind::Enrolment).unwrap().is_none());
        assert!(load_run_report(&p).unwrap().is_none());
    }

    #[test]
    fn test_anomaly_file_layout() {
        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        let records = vec![AnomalyRecord {
            state: "Kerala".into(),
            district: "Kochi".into(),
            month: Month::new(2025, 3).unwrap(),
            value: 100.0,
            mean: 32.5,
            std: 45.0,
            z: 1.5,
            label: AnomalyLabel::Outlier,
        }];
        write_anomalies(&p.anomalies(), &records).unwrap();
        let text = std::fs::read_to_string(p.anomalies()).unwrap();
        assert!(text.starts_with("State,District,Month,Value,Mean,Std,Z_Score,Label\n"));
        assert!(text.contains("2025-03"));
        assert!(text.contains("outlier"));
        assert_eq!(load_anomalies(&p).unwrap().unwrap(), records);
    }

    #[test]
    fn test_empty_rows_keep_header() {
        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        write_anomalies(&p.anomalies(), &[]).unwrap();
        assert_eq!(load_anomalies(&p).unwrap().unwrap().len(), 0);
    }
}
