use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use nyc_permits::app::{
    AggregateInputs, AggregateUseCase, BaselineInputs, BaselineUseCase, EnrichInputs, EnrichUseCase,
    InspectUseCase, PipelineUseCase, UnifyInputs, UnifyUseCase,
};
use nyc_permits::config::PipelineConfig;
use nyc_permits::pipeline::storage::ParquetTableStore;
use nyc_permits::{logging, observability};

#[derive(Parser)]
#[command(name = "permits")]
#[command(about = "NYC building permit reconciliation and district aggregation pipeline")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults to $PERMITS_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge both raw permit feeds into the canonical table
    Unify {
        #[arg(long)]
        historical_input: Option<PathBuf>,
        #[arg(long)]
        dob_now_input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Attach a community district to every unified permit
    AssignDistricts,
    /// Build the monthly per-district counts and the modeling subset
    Aggregate {
        /// Minimum all-time permits for a district to enter the modeling subset
        #[arg(long)]
        min_district_total: Option<u64>,
    },
    /// Score the rolling 12-month mean forecast per district
    Baseline,
    /// Re-derive the modeling subset from a persisted full aggregate and print its shape
    Inspect {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        min_district_total: Option<u64>,
        /// Modeling rows to print
        #[arg(long, default_value_t = 10)]
        preview: usize,
    },
    /// unify, assign-districts, aggregate and baseline in sequence
    Run,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config_path = PipelineConfig::config_path(cli.config.as_deref());
    let mut config = PipelineConfig::load(config_path.as_deref()).context("loading configuration")?;
    logging::init_logging(&config.logging);
    match &config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file given; using built-in defaults"),
    }
    observability::init()?;

    let result = run(cli.command, &mut config);
    if let Err(e) = &result {
        error!("Pipeline failed: {:#}", e);
    }

    if let Some(path) = &config.metrics.snapshot_path {
        observability::write_snapshot(path)?;
    }
    result
}

fn run(command: Commands, config: &mut PipelineConfig) -> Result<()> {
    let store = ParquetTableStore::new();
    let manifest_dir = config.paths.manifest_dir.clone();

    match command {
        Commands::Unify {
            historical_input,
            dob_now_input,
            output,
        } => {
            if let Some(path) = historical_input {
                config.paths.historical_input = path;
            }
            if let Some(path) = dob_now_input {
                config.paths.dob_now_input = path;
            }
            if let Some(path) = output {
                config.paths.unified_output = path;
            }
            let outcome = UnifyUseCase::new(&store).execute(
                &UnifyInputs::from_config(config),
                config.overlap_window(),
                &manifest_dir,
            )?;
            println!("Unified {} permits -> {}", outcome.output.rows, outcome.output.path);
            for (source, rows) in &outcome.rows_per_source {
                println!("  {}: {} rows", source, rows);
            }
            println!(
                "  cross-source collisions in overlap window: {}",
                outcome.overlap.cross_system_collisions
            );
        }
        Commands::AssignDistricts => {
            let outcome = EnrichUseCase::new(&store)
                .execute(&EnrichInputs::from_config(config)?, &manifest_dir)?;
            let report = &outcome.report;
            println!("Assigned districts -> {}", outcome.output.path);
            println!(
                "  {} rows, {} matched, {} outside all districts, {} without coordinates, \
                 {} multi-match",
                report.joined_rows,
                report.matched(),
                report.outside_all,
                report.without_coordinates,
                report.multi_match
            );
        }
        Commands::Aggregate { min_district_total } => {
            if let Some(total) = min_district_total {
                config.aggregate.min_district_total = total;
            }
            let outcome = AggregateUseCase::new(&store)
                .execute(&AggregateInputs::from_config(config), &manifest_dir)?;
            println!(
                "Monthly aggregate: {} rows over {} districts; \
                 modeling keeps {} districts ({} rows)",
                outcome.aggregation.aggregate_rows,
                outcome.aggregation.districts,
                outcome.modeling.kept_districts.len(),
                outcome.modeling.rows
            );
        }
        Commands::Baseline => {
            let outcome = BaselineUseCase::new(&store)
                .execute(&BaselineInputs::from_config(config), &manifest_dir)?;
            let report = &outcome.report;
            println!("Districts evaluated: {}", report.districts_evaluated());
            if let (Some(mae), Some(smape)) =
                (report.avg_validation_mae, report.avg_validation_smape)
            {
                println!("Avg validation MAE: {:.4}", mae);
                println!("Avg validation sMAPE: {:.4}", smape);
            }
        }
        Commands::Inspect {
            input,
            min_district_total,
            preview,
        } => {
            let input = input.unwrap_or_else(|| config.paths.monthly_output.clone());
            let total = min_district_total.unwrap_or(config.aggregate.min_district_total);
            let summary = InspectUseCase::new(&store).execute(&input, total, preview)?;
            println!("{}", summary);
        }
        Commands::Run => {
            let outcome = PipelineUseCase::new(&store, config).execute()?;
            info!(
                "Run finished with {} baseline districts",
                outcome.baseline.report.districts_evaluated()
            );
            println!(
                "Pipeline complete: {} unified, {} monthly rows, {} districts evaluated",
                outcome.unify.output.rows,
                outcome.aggregate.aggregation.aggregate_rows,
                outcome.baseline.report.districts_evaluated()
            );
        }
    }
    Ok(())
}
