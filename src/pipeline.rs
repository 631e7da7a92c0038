//! Pipeline orchestrator
//!
//! Runs map -> clean -> analytics. Each source and each analytic is its own
//! failure domain: a failure is logged, recorded in the `RunReport` and the
//! remaining work continues. Only a missing mapping stops cleaning.

use crate::aggregator::AggregationStats;
use crate::analytics::{cluster_entities, detect_anomalies, forecast_source, profile_table, ForecastSummary};
use crate::artifacts::{self, ArtifactPaths};
use crate::cleaner::{load_master, CleanedTable, TableCleaner};
use crate::config::{PipelineConfig, SourceKind};
use crate::error::{PipelineError, Result};
use crate::report::{RunReport, StageLog};
use crate::resolver::{generate_mapping, NameMapping, ResolverOutput};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub type Tables = BTreeMap<SourceKind, CleanedTable>;

pub struct PipelineRunner {
    config: Arc<PipelineConfig>,
    paths: ArtifactPaths,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let paths = ArtifactPaths::new(&config);
        Ok(Self {
            config: Arc::new(config),
            paths,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn new_report(&self) -> RunReport {
        RunReport::new(&self.config)
    }

    /// Build and persist the name mapping from every readable raw source.
    pub fn map(&self, report: &mut RunReport) -> Result<ResolverOutput> {
        let started = Instant::now();
        match generate_mapping(&self.config) {
            Ok(output) => {
                report.add_stage(
                    StageLog::new("map")
                        .with_rows(output.stats.distinct_pairs, output.stats.mapped_pairs)
                        .with_artifact(self.paths.mapping())
                        .with_artifact(self.paths.review_queue())
                        .with_note(format!("{} spellings queued for review", output.review_queue.len()))
                        .timed(started),
                );
                Ok(output)
            }
            Err(e) => {
                error!("Mapping failed: {}", e);
                report.add_stage(StageLog::new("map").with_error(&e).timed(started));
                Err(e)
            }
        }
    }

    /// Clean the selected sources (all when `only` is `None`).
    ///
    /// Fails only when the mapping is missing; per-source failures are
    /// recorded and that source is left out of the returned tables.
    pub fn clean(&self, only: Option<SourceKind>, report: &mut RunReport) -> Result<Tables> {
        let mapping = match NameMapping::load(&self.paths.mapping()) {
            Ok(mapping) => mapping,
            Err(e) => {
                error!("{}", e);
                report.add_stage(StageLog::new("clean").with_error(&e));
                return Err(e);
            }
        };
        let cleaner = TableCleaner::new(&mapping)?;
        let rejected = cleaner.rejected_entries();

        let mut tables = Tables::new();
        for spec in self.config.sources.iter().filter(|s| only.map_or(true, |k| k == s.kind)) {
            let started = Instant::now();
            let out_path = self.config.master_path(spec);
            let stage = StageLog::new("clean").for_source(spec.kind);
            let outcome = cleaner
                .clean_file(&self.config.raw_path(spec), spec, &out_path)
                .and_then(|(frame, clean_report)| {
                    CleanedTable::from_frame(&frame, spec).map(|table| (table, clean_report))
                });
            match outcome {
                Ok((table, clean_report)) => {
                    let mut log = stage
                        .with_rows(clean_report.input_rows, clean_report.output_rows)
                        .with_artifact(out_path);
                    if rejected > 0 {
                        log = log.with_note(format!(
                            "{} mapping entries ignored for a non-canonical state",
                            rejected
                        ));
                    }
                    report.add_stage(log.timed(started));
                    tables.insert(spec.kind, table);
                }
                Err(e) => {
                    error!("Cleaning {} failed: {}", spec.kind, e);
                    report.add_stage(stage.with_error(&e).timed(started));
                }
            }
        }
        Ok(tables)
    }

    /// Load previously written master tables.
    pub fn load_masters(&self, report: &mut RunReport) -> Tables {
        let mut tables = Tables::new();
        for spec in &self.config.sources {
            let path = self.config.master_path(spec);
            match load_master(&path, spec) {
                Ok(table) => {
                    info!("{}: loaded {} cleaned rows", spec.kind, table.len());
                    tables.insert(spec.kind, table);
                }
                Err(e) => {
                    warn!("{}", e);
                    report.add_stage(StageLog::new("load").for_source(spec.kind).with_error(&e));
                }
            }
        }
        tables
    }

    /// Run every analytic on blocking worker tasks and record the outcomes.
    pub async fn analyze(&self, tables: Tables, report: &mut RunReport) {
        let tables = Arc::new(tables);
        let mut handles: Vec<(&str, JoinHandle<Vec<StageLog>>)> = Vec::new();

        let analytics: [(&str, fn(&PipelineConfig, &ArtifactPaths, &Tables) -> Vec<StageLog>); 4] = [
            ("anomaly", anomaly_stage),
            ("cluster", cluster_stage),
            ("forecast", forecast_stage),
            ("profile", profile_stage),
        ];
        for (name, stage) in analytics {
            let config = Arc::clone(&self.config);
            let paths = self.paths.clone();
            let tables = Arc::clone(&tables);
            handles.push((
                name,
                tokio::task::spawn_blocking(move || stage(&config, &paths, &tables)),
            ));
        }

        for (name, handle) in handles {
            match handle.await {
                Ok(logs) => logs.into_iter().for_each(|log| report.add_stage(log)),
                Err(e) => {
                    error!("{} task did not complete: {}", name, e);
                    report.add_stage(StageLog::new(name).with_failure("TaskError", e.to_string()));
                }
            }
        }
    }

    pub fn save_report(&self, report: &mut RunReport) -> Result<()> {
        report.finish();
        report.save(&self.paths.run_report())?;
        info!("Run {} report written to {}", report.run_id, self.paths.run_report().display());
        Ok(())
    }

    /// Full run: map, clean every source, analyze, write the report.
    pub async fn run(&self) -> Result<RunReport> {
        let mut report = self.new_report();
        info!("Starting run {}", report.run_id);

        let outcome = match self.map(&mut report) {
            Ok(_) => self.clean(None, &mut report),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(tables) => self.analyze(tables, &mut report).await,
            Err(e) => warn!("Skipping analytics: {}", e),
        }

        self.save_report(&mut report)?;
        let failed = report.failed_stages().len();
        if failed > 0 {
            warn!("Run {} finished with {} failed stages", report.run_id, failed);
        } else {
            info!("Run {} finished", report.run_id);
        }
        Ok(report)
    }
}

fn missing_table(stage: &str, source: SourceKind) -> StageLog {
    StageLog::new(stage)
        .for_source(source)
        .skipped(format!("no cleaned {} table", source))
}

/// Rows in are cleaned rows; rows dropped are those with an unparsable date.
fn dated_rows(stage: StageLog, aggregation: &AggregationStats) -> StageLog {
    let stage = stage.with_rows(aggregation.rows_in, aggregation.rows_aggregated);
    if aggregation.unparsable_dates > 0 {
        stage.with_note(format!("{} rows with unparsable dates", aggregation.unparsable_dates))
    } else {
        stage
    }
}

fn anomaly_stage(config: &PipelineConfig, paths: &ArtifactPaths, tables: &Tables) -> Vec<StageLog> {
    let source = config.anomaly_source;
    let Some(table) = tables.get(&source) else {
        return vec![missing_table("anomaly", source)];
    };
    let started = Instant::now();
    let stage = StageLog::new("anomaly").for_source(source);
    let outcome = detect_anomalies(config, table).and_then(|result| {
        artifacts::write_anomalies(&paths.anomalies(), &result.records)?;
        Ok(result)
    });
    let log = match outcome {
        Ok(result) => dated_rows(stage, &result.aggregation)
            .with_artifact(paths.anomalies())
            .with_note(format!(
                "{} entity-months, {} outliers",
                result.records.len(),
                result.outlier_count()
            )),
        Err(e) => {
            error!("Anomaly scoring failed: {}", e);
            stage.with_error(&e)
        }
    };
    vec![log.timed(started)]
}

fn cluster_stage(config: &PipelineConfig, paths: &ArtifactPaths, tables: &Tables) -> Vec<StageLog> {
    let source = config.cluster_source;
    let Some(table) = tables.get(&source) else {
        return vec![missing_table("cluster", source)];
    };
    let started = Instant::now();
    let stage = StageLog::new("cluster").for_source(source);
    let outcome = cluster_entities(config, table).and_then(|result| {
        artifacts::write_clusters(paths, &result.assignments, &result.summaries)?;
        Ok(result)
    });
    let log = match outcome {
        Ok(result) => stage
            .with_rows(table.len(), result.assignments.len())
            .with_artifact(paths.clusters())
            .with_artifact(paths.cluster_summary()),
        Err(e) => {
            error!("Clustering failed: {}", e);
            stage.with_error(&e)
        }
    };
    vec![log.timed(started)]
}

fn forecast_stage(config: &PipelineConfig, paths: &ArtifactPaths, tables: &Tables) -> Vec<StageLog> {
    let mut logs = Vec::new();
    let mut summaries: Vec<ForecastSummary> = Vec::new();

    for spec in &config.sources {
        let Some(table) = tables.get(&spec.kind) else {
            logs.push(missing_table("forecast", spec.kind));
            continue;
        };
        let started = Instant::now();
        let stage = StageLog::new("forecast").for_source(spec.kind);
        let outcome = forecast_source(config, table)
            .and_then(|series| artifacts::write_forecast(paths, &series).map(|path| (series, path)));
        let log = match outcome {
            Ok((series, path)) => {
                let summary = series.summary();
                let log = dated_rows(stage, &series.aggregation)
                    .with_artifact(path)
                    .with_note(format!("status {:?}", series.status));
                // a failed fit still writes history but counts as a failed stage
                let log = match &series.detail {
                    Some(detail) => log.with_error(&PipelineError::model_fit("holt_winters", detail.clone())),
                    None => log,
                };
                summaries.push(summary);
                log
            }
            Err(e) => {
                error!("Forecasting {} failed: {}", spec.kind, e);
                stage.with_error(&e)
            }
        };
        logs.push(log.timed(started));
    }

    let summary_log = StageLog::new("forecast_summary");
    let summary_log = match artifacts::write_forecast_summary(&paths.forecast_summary(), &summaries) {
        Ok(()) => summary_log.with_artifact(paths.forecast_summary()),
        Err(e) => summary_log.with_error(&e),
    };
    logs.push(summary_log);
    logs
}

fn profile_stage(config: &PipelineConfig, paths: &ArtifactPaths, tables: &Tables) -> Vec<StageLog> {
    config
        .sources
        .iter()
        .map(|spec| {
            let Some(table) = tables.get(&spec.kind) else {
                return missing_table("profile", spec.kind);
            };
            let started = Instant::now();
            let profile = profile_table(table);
            let stage = StageLog::new("profile").for_source(spec.kind);
            let log = match artifacts::write_profile(paths, spec.kind, &profile) {
                Ok(()) => stage
                    .with_artifact(paths.state_stats(spec.kind))
                    .with_artifact(paths.profile(spec.kind)),
                Err(e) => stage.with_error(&e),
            };
            log.timed(started)
        })
        .collect()
}
