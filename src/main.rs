use aadhaar_pulse::artifacts;
use aadhaar_pulse::config::{PipelineConfig, SourceKind};
use aadhaar_pulse::pipeline::PipelineRunner;
use aadhaar_pulse::report::StageStatus;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aadhaar-pulse")]
#[command(about = "Region normalization and analytics over Aadhaar update records")]
#[command(version)]
struct Args {
    /// JSON config file; unset fields keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding raw/, mappings/ and processed/
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory for analytic artifacts
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Seed for the randomized models
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the state/district name mapping from the raw sources
    Map,
    /// Apply the mapping and write cleaned master tables
    Clean {
        /// Clean a single source (biometric, enrolment, demographic)
        #[arg(long)]
        source: Option<SourceKind>,
    },
    /// Run anomaly, clustering, forecast and profile analytics on master tables
    Analyze,
    /// Map, clean and analyze in one go
    Run,
    /// Summarize the artifacts currently on disk
    Inspect,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_config(args: &Args) -> Result<PipelineConfig> {
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let mut config = config.apply_env()?;
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.verbose);

    let config = resolve_config(&args)?;
    let runner = PipelineRunner::new(config)?;

    match args.command {
        Commands::Map => {
            let mut report = runner.new_report();
            let outcome = runner.map(&mut report);
            runner.save_report(&mut report)?;
            let output = outcome?;
            println!(
                "Mapped {} of {} raw pairs ({} dropped, {} unresolved, {} possible duplicates)",
                output.stats.mapped_pairs,
                output.stats.distinct_pairs,
                output.stats.dropped_pairs,
                output.stats.unresolved_pairs,
                output.stats.flagged_duplicates
            );
            for entry in &output.review_queue {
                println!(
                    "  review: {:?} ({} pairs) suggestion: {}",
                    entry.raw_state,
                    entry.pairs,
                    entry.suggestion.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Clean { source } => {
            let mut report = runner.new_report();
            let outcome = runner.clean(source, &mut report);
            runner.save_report(&mut report)?;
            let tables = outcome?;
            for (kind, table) in &tables {
                println!("{}: {} cleaned rows", kind, table.len());
            }
        }
        Commands::Analyze => {
            let mut report = runner.new_report();
            let tables = runner.load_masters(&mut report);
            if tables.is_empty() {
                warn!("No master tables found; run `clean` first");
            }
            runner.analyze(tables, &mut report).await;
            runner.save_report(&mut report)?;
            print_stages(&report);
        }
        Commands::Run => {
            let report = runner.run().await?;
            print_stages(&report);
        }
        Commands::Inspect => inspect(&runner)?,
    }
    Ok(())
}

fn print_stages(report: &aadhaar_pulse::RunReport) {
    println!("Run {}", report.run_id);
    for stage in &report.stages {
        let scope = stage.source.map(|s| s.to_string()).unwrap_or_default();
        let status = match stage.status {
            StageStatus::Succeeded => "ok",
            StageStatus::Failed => "FAILED",
            StageStatus::Skipped => "skipped",
        };
        println!(
            "  {:<16} {:<12} {:<8} {}",
            stage.stage,
            scope,
            status,
            stage.error.as_deref().unwrap_or("")
        );
    }
}

fn inspect(runner: &PipelineRunner) -> Result<()> {
    let paths = runner.paths();

    match artifacts::load_mapping(paths)? {
        Some(mapping) => println!("Mapping: {} entries", mapping.len()),
        None => println!("Mapping: not built"),
    }
    if let Some(queue) = artifacts::load_review_queue(paths)? {
        println!("Review queue: {} spellings", queue.len());
    }

    match artifacts::load_anomalies(paths)? {
        Some(records) => {
            let outliers = records.iter().filter(|r| r.is_outlier()).count();
            println!("Anomalies: {} of {} entity-months flagged", outliers, records.len());
        }
        None => println!("Anomalies: not available"),
    }

    match artifacts::load_cluster_summary(paths)? {
        Some(summaries) => {
            println!("Clusters:");
            for s in summaries {
                println!(
                    "  #{} {} districts, mean volume {:.1}, child share {:.3}",
                    s.cluster, s.count, s.mean_volume, s.mean_child_share
                );
            }
        }
        None => println!("Clusters: not available"),
    }

    match artifacts::load_forecast_summary(paths)? {
        Some(rows) => {
            println!("Forecasts:");
            for row in rows {
                let rmse = row.rmse.map(|r| format!("{:.2}", r)).unwrap_or_else(|| "-".into());
                println!("  {:<12} {:?} rmse {}", row.metric, row.status, rmse);
            }
        }
        None => println!("Forecasts: not available"),
    }

    for kind in SourceKind::all() {
        if let Some(profile) = artifacts::load_profile(paths, kind)? {
            let top = profile.state_totals.first().map(|s| s.state.as_str()).unwrap_or("-");
            println!(
                "Profile {}: {} rows, {} districts, top state {}",
                kind, profile.rows, profile.districts, top
            );
        }
    }

    match artifacts::load_run_report(paths)? {
        Some(report) => {
            info!("Last run {} had {} stages", report.run_id, report.stages.len());
            print_stages(&report);
        }
        None => println!("No run report"),
    }
    Ok(())
}
