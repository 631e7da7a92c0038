//! Table Cleaner
//!
//! Applies a `NameMapping` to one raw source: exact-key join on the raw region
//! pair, drop of unmapped rows, numeric coercion and a derived `Total` column.

use crate::config::{
    SourceKind, SourceSpec, DATE_COLUMN, DISTRICT_COLUMN, STATE_COLUMN, TOTAL_COLUMN,
};
use crate::error::{PipelineError, Result};
use crate::resolver::NameMapping;
use crate::types::CanonicalEntity;
use polars::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const RAW_STATE_KEY: &str = "__raw_state";
const RAW_DISTRICT_KEY: &str = "__raw_district";
const MAPPED_STATE: &str = "__mapped_state";
const MAPPED_DISTRICT: &str = "__mapped_district";

/// One row of a cleaned master table.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecord {
    /// Raw date text; parsed later by the aggregator
    pub date: String,
    pub entity: CanonicalEntity,
    /// Values in the order of `CleanedTable::metrics`
    pub values: Vec<f64>,
    pub total: f64,
}

/// In-memory cleaned master table handed to the analytics.
#[derive(Debug, Clone)]
pub struct CleanedTable {
    pub source: SourceKind,
    pub metrics: Vec<String>,
    pub records: Vec<CleanedRecord>,
}

impl CleanedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn metric_index(&self, name: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m == name)
    }

    /// Value of a metric (or `Total`) for one record.
    pub fn value(&self, record: &CleanedRecord, metric: &str) -> Option<f64> {
        if metric == TOTAL_COLUMN {
            return Some(record.total);
        }
        self.metric_index(metric).map(|i| record.values[i])
    }

    /// Convert a cleaned frame (`Date, State, District, ..., metrics, Total`).
    pub fn from_frame(df: &DataFrame, spec: &SourceSpec) -> Result<Self> {
        let dates = df.column(DATE_COLUMN)?.str()?;
        let states = df.column(STATE_COLUMN)?.str()?;
        let districts = df.column(DISTRICT_COLUMN)?.str()?;
        let totals = df.column(TOTAL_COLUMN)?.f64()?;
        let metric_columns = spec
            .metrics
            .iter()
            .map(|m| df.column(m).and_then(|s| s.f64()))
            .collect::<PolarsResult<Vec<_>>>()?;

        let mut records = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let (Some(state), Some(district)) = (states.get(idx), districts.get(idx)) else {
                continue;
            };
            records.push(CleanedRecord {
                date: dates.get(idx).unwrap_or("").to_string(),
                entity: CanonicalEntity::new(state, district),
                values: metric_columns
                    .iter()
                    .map(|c| c.get(idx).unwrap_or(0.0))
                    .collect(),
                total: totals.get(idx).unwrap_or(0.0),
            });
        }

        Ok(Self {
            source: spec.kind,
            metrics: spec.metrics.clone(),
            records,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub source: SourceKind,
    pub input_rows: usize,
    pub output_rows: usize,
    pub dropped_rows: usize,
    pub output_path: Option<PathBuf>,
}

pub struct TableCleaner {
    mapping_frame: DataFrame,
    rejected_entries: usize,
}

impl TableCleaner {
    /// Entries whose corrected state is outside the taxonomy are ignored, so
    /// their raw pairs drop like any unmapped pair.
    pub fn new(mapping: &NameMapping) -> Result<Self> {
        let mut mapping = mapping.clone();
        let rejected = mapping.retain_canonical();
        if !rejected.is_empty() {
            warn!(
                "ignoring {} mapping entries with a non-canonical state",
                rejected.len()
            );
        }
        let entries = mapping.entries();
        let raw_states: Vec<&str> = entries.iter().map(|e| e.original_state.as_str()).collect();
        let raw_districts: Vec<&str> = entries.iter().map(|e| e.original_district.as_str()).collect();
        let states: Vec<&str> = entries.iter().map(|e| e.corrected_state.as_str()).collect();
        let districts: Vec<&str> = entries.iter().map(|e| e.corrected_district.as_str()).collect();
        let mapping_frame = df![
            RAW_STATE_KEY => raw_states,
            RAW_DISTRICT_KEY => raw_districts,
            MAPPED_STATE => states,
            MAPPED_DISTRICT => districts,
        ]?;
        Ok(Self {
            mapping_frame,
            rejected_entries: rejected.len(),
        })
    }

    /// Mapping entries ignored for a corrected state outside the taxonomy.
    pub fn rejected_entries(&self) -> usize {
        self.rejected_entries
    }

    /// Read a raw source with every column kept as text.
    pub fn read_raw(path: &Path, spec: &SourceSpec) -> Result<DataFrame> {
        if !path.exists() {
            return Err(PipelineError::source_read(
                spec.kind.as_str(),
                format!("raw file not found: {}", path.display()),
            ));
        }
        LazyCsvReader::new(path)
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .finish()
            .and_then(|lf| lf.collect())
            .map_err(|e| PipelineError::source_read(spec.kind.as_str(), e.to_string()))
    }

    /// Clean a raw frame. Returns the master frame and the number of dropped rows.
    pub fn clean_frame(&self, raw: DataFrame, spec: &SourceSpec) -> Result<(DataFrame, usize)> {
        let mut required = vec![&spec.date_column, &spec.state_column, &spec.district_column];
        required.extend(spec.metrics.iter());
        let missing: Vec<&str> = required
            .iter()
            .filter(|c| raw.column(c.as_str()).is_err())
            .map(|c| c.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::source_read(
                spec.kind.as_str(),
                format!("missing columns: {}", missing.join(", ")),
            ));
        }

        let input_rows = raw.height();
        let state_col = spec.state_column.as_str();
        let district_col = spec.district_column.as_str();

        let mut select = vec![
            col(spec.date_column.as_str()).alias(DATE_COLUMN),
            col(MAPPED_STATE).alias(STATE_COLUMN),
            col(MAPPED_DISTRICT).alias(DISTRICT_COLUMN),
        ];
        for extra in &spec.passthrough {
            if raw.column(extra).is_ok() && !spec.metrics.contains(extra) {
                select.push(col(extra.as_str()));
            }
        }

        let coerced: Vec<Expr> = spec
            .metrics
            .iter()
            .map(|m| col(m.as_str()).cast(DataType::Float64).fill_null(lit(0.0)))
            .collect();
        for (metric, expr) in spec.metrics.iter().zip(coerced.iter()) {
            select.push(expr.clone().alias(metric.as_str()));
        }
        let total = coerced
            .iter()
            .cloned()
            .reduce(|acc, e| acc + e)
            .unwrap_or_else(|| lit(0.0));
        select.push(total.alias(TOTAL_COLUMN));

        let cleaned = raw
            .lazy()
            .with_columns([
                col(state_col).fill_null(lit("")),
                col(district_col).fill_null(lit("")),
            ])
            .join(
                self.mapping_frame.clone().lazy(),
                [col(state_col), col(district_col)],
                [col(RAW_STATE_KEY), col(RAW_DISTRICT_KEY)],
                JoinArgs::new(JoinType::Left),
            )
            .filter(col(MAPPED_STATE).is_not_null())
            .select(select)
            .collect()?;

        let dropped = input_rows.saturating_sub(cleaned.height());
        Ok((cleaned, dropped))
    }

    /// Read, clean and write one source.
    pub fn clean_file(
        &self,
        raw_path: &Path,
        spec: &SourceSpec,
        output_path: &Path,
    ) -> Result<(DataFrame, CleanReport)> {
        let raw = Self::read_raw(raw_path, spec)?;
        let input_rows = raw.height();
        let (mut cleaned, dropped) = self.clean_frame(raw, spec)?;

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(output_path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut cleaned)?;

        if dropped > 0 {
            warn!("{}: dropped {} unmappable rows", spec.kind, dropped);
        }
        info!(
            "{}: {} -> {} rows written to {}",
            spec.kind,
            input_rows,
            cleaned.height(),
            output_path.display()
        );

        let report = CleanReport {
            source: spec.kind,
            input_rows,
            output_rows: cleaned.height(),
            dropped_rows: dropped,
            output_path: Some(output_path.to_path_buf()),
        };
        Ok((cleaned, report))
    }
}

/// Load a previously written master table.
pub fn load_master(path: &Path, spec: &SourceSpec) -> Result<CleanedTable> {
    if !path.exists() {
        return Err(PipelineError::source_read(
            spec.kind.as_str(),
            format!("master table not found: {}", path.display()),
        ));
    }
    let mut numeric: Vec<Expr> = spec
        .metrics
        .iter()
        .map(|m| col(m.as_str()).cast(DataType::Float64).fill_null(lit(0.0)))
        .collect();
    numeric.push(col(TOTAL_COLUMN).cast(DataType::Float64).fill_null(lit(0.0)));

    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()
        .and_then(|lf| lf.with_columns(numeric).collect())
        .map_err(|e| PipelineError::source_read(spec.kind.as_str(), e.to_string()))?;

    CleanedTable::from_frame(&df, spec)
}
