use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source read error ({source_name}): {reason}")]
    SourceRead { source_name: String, reason: String },

    #[error("Name mapping not found at {0}; run the resolver first")]
    MappingMissing(PathBuf),

    #[error("Model fit error ({component}): {reason}")]
    ModelFit { component: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl PipelineError {
    pub fn source_read<S: Into<String>, R: Into<String>>(source_name: S, reason: R) -> Self {
        PipelineError::SourceRead {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn model_fit<S: Into<String>, R: Into<String>>(component: S, reason: R) -> Self {
        PipelineError::ModelFit {
            component: component.into(),
            reason: reason.into(),
        }
    }

    /// Short class name used in run reports.
    pub fn class(&self) -> &'static str {
        match self {
            PipelineError::SourceRead { .. } => "SourceReadError",
            PipelineError::MappingMissing(_) => "MappingMissingError",
            PipelineError::ModelFit { .. } => "ModelFitError",
            PipelineError::Config(_) => "ConfigError",
            PipelineError::Io(_) => "IoError",
            PipelineError::Csv(_) => "CsvError",
            PipelineError::Json(_) => "JsonError",
            PipelineError::Polars(_) => "PolarsError",
        }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
