//! Run Report
//!
//! Structured record of every stage a run attempted, written to
//! `run_report.json` next to the analytic artifacts.

use crate::config::{PipelineConfig, SourceKind};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Outcome of one stage, optionally scoped to a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLog {
    pub stage: String,
    pub source: Option<SourceKind>,
    pub status: StageStatus,
    pub error_class: Option<String>,
    pub error: Option<String>,
    pub rows_in: Option<usize>,
    pub rows_out: Option<usize>,
    pub dropped_rows: Option<usize>,
    pub artifacts: Vec<PathBuf>,
    pub notes: Vec<String>,
    pub duration_ms: u64,
}

impl StageLog {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            source: None,
            status: StageStatus::Succeeded,
            error_class: None,
            error: None,
            rows_in: None,
            rows_out: None,
            dropped_rows: None,
            artifacts: Vec::new(),
            notes: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn for_source(mut self, source: SourceKind) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_rows(mut self, rows_in: usize, rows_out: usize) -> Self {
        self.rows_in = Some(rows_in);
        self.rows_out = Some(rows_out);
        self.dropped_rows = Some(rows_in.saturating_sub(rows_out));
        self
    }

    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifacts.push(path.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_error(self, error: &PipelineError) -> Self {
        self.with_failure(error.class(), error.to_string())
    }

    pub fn with_failure(mut self, class: &str, message: impl Into<String>) -> Self {
        self.status = StageStatus::Failed;
        self.error_class = Some(class.to_string());
        self.error = Some(message.into());
        self
    }

    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.status = StageStatus::Skipped;
        self.notes.push(reason.into());
        self
    }

    pub fn timed(mut self, started: Instant) -> Self {
        self.duration_ms = started.elapsed().as_millis() as u64;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub random_seed: u64,
    pub stages: Vec<StageLog>,
}

impl RunReport {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            data_dir: config.data_dir.clone(),
            output_dir: config.output_dir.clone(),
            random_seed: config.random_seed,
            stages: Vec::new(),
        }
    }

    pub fn add_stage(&mut self, log: StageLog) {
        self.stages.push(log);
    }

    pub fn stage(&self, stage: &str, source: Option<SourceKind>) -> Option<&StageLog> {
        self.stages
            .iter()
            .find(|s| s.stage == stage && s.source == source)
    }

    pub fn failed_stages(&self) -> Vec<&StageLog> {
        self.stages.iter().filter(|s| s.is_failed()).collect()
    }

    pub fn succeeded(&self) -> bool {
        self.failed_stages().is_empty()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
