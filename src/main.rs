mod abort;
mod annealing;
mod config;
mod dataset;
mod output;
mod scheduler;
mod timing;
mod validation;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::abort::{cancel_on_ctrl_c, CancelToken};
use crate::annealing::Annealer;
use crate::config::{Config, ConfigError};
use crate::dataset::{build_availability, load_dataset, Availability, Dataset, DatasetError, DatasetStats};
use crate::output::{generate_run_id, ArtifactsManager, OutputError, OutputFormat};
use crate::scheduler::{Plan, PlanFile, RankingMethod, RunSummary, Scheduler, SchedulerError};
use crate::validation::validate_plan;

#[derive(Parser)]
#[command(name = "pass-o-mat")]
#[command(about = "Ground station antenna scheduling for satellite passes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a dataset and write the plan
    Schedule {
        /// CSV directory or YAML file
        dataset: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
        #[arg(long, default_value = "yaml")]
        format: OutputFormat,
        /// Station ranking heuristic (A, B or C)
        #[arg(long)]
        ranking: Option<RankingMethod>,
        /// Disable reallocation of earlier passes
        #[arg(long)]
        no_optimization: bool,
        /// Run simulated annealing after the greedy pass
        #[arg(long)]
        sa: bool,
        #[arg(long)]
        sa_budget: Option<humantime::Duration>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Audit an existing plan file against a dataset
    Validate {
        dataset: PathBuf,
        plan: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print dataset statistics
    Stats {
        dataset: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Output error: {0}")]
    Output(#[from] OutputError),
    #[error("Error reading plan {0}: {1}")]
    PlanRead(PathBuf, String),
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Schedule {
            dataset,
            config,
            output,
            format,
            ranking,
            no_optimization,
            sa,
            sa_budget,
            seed,
        } => load_config(config.as_deref()).and_then(|mut config| {
            if let Some(ranking) = ranking {
                config.ranking_method = ranking;
            }
            if no_optimization {
                config.optimization = false;
            }
            if sa {
                config.annealing.enabled = true;
            }
            if let Some(budget) = sa_budget {
                config.annealing.time_budget = budget.into();
            }
            if let Some(seed) = seed {
                config.annealing.seed = seed;
            }
            config.validate()?;
            schedule(&dataset, &config, &output, format)
        }),
        Commands::Validate {
            dataset,
            plan,
            config,
        } => load_config(config.as_deref()).and_then(|config| validate(&dataset, &plan, &config)),
        Commands::Stats { dataset, config } => {
            load_config(config.as_deref()).and_then(|config| stats(&dataset, &config))
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, CliError> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None => Ok(Config::default()),
    }
}

fn load(path: &Path, config: &Config) -> Result<(Dataset, Availability), CliError> {
    let dataset = load_dataset(path, &config.dataset.stations)?;
    let availability = build_availability(&dataset, &config.dataset.builder_options())?;
    Ok((dataset, availability))
}

fn schedule(
    path: &Path,
    config: &Config,
    output: &Path,
    format: OutputFormat,
) -> Result<ExitCode, CliError> {
    let started_at = chrono::Utc::now();
    let run_id = generate_run_id(started_at);
    let (dataset, availability) = load(path, config)?;

    let mut artifacts = ArtifactsManager::new(output, &run_id, format)?;
    artifacts.record_dataset(path, DatasetStats::collect(&dataset, &availability));
    artifacts.record_config(config);

    let outcome = Scheduler::new(&availability, config)?.run();
    let mut plan = outcome.plan;
    let mut summary = outcome.summary;

    if config.annealing.enabled {
        let cancel = CancelToken::new();
        if let Err(e) = cancel_on_ctrl_c(&cancel) {
            log::warn!("Ctrl-C will not stop annealing early: {}", e);
        }
        let annealed = Annealer::new(&availability, &config.annealing, cancel)
            .with_bands(&config.bands)
            .optimize(&plan);
        plan = annealed.plan;
        summary = RunSummary::collect(
            &availability,
            &plan,
            summary.reallocation,
            Duration::from_millis(summary.elapsed_ms),
        );
        artifacts.record_annealing(annealed.stats);
    }

    let report = validate_plan(&availability, &plan);
    artifacts.write_plan(&plan.to_file(&availability))?;
    artifacts.write_validation(&report)?;
    artifacts.record_violations(report.violation_count());
    println!("{}", summary);
    println!("{}", report);
    artifacts.record_summary(summary);
    artifacts.finish()?;
    println!("Run {} written to {}", run_id, artifacts.run_dir().display());

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn validate(dataset: &Path, plan_path: &Path, config: &Config) -> Result<ExitCode, CliError> {
    let (_, availability) = load(dataset, config)?;
    let content = fs::read_to_string(plan_path)
        .map_err(|e| CliError::PlanRead(plan_path.to_path_buf(), e.to_string()))?;
    let is_json = plan_path.extension().is_some_and(|ext| ext == "json");
    let file: PlanFile = if is_json {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&content).map_err(|e| e.to_string())
    }
    .map_err(|e| CliError::PlanRead(plan_path.to_path_buf(), e))?;

    let plan = Plan::from_file(&file, &availability)?;
    let report = validate_plan(&availability, &plan);
    println!("{}", plan.summary(&availability));
    println!("{}", report);

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn stats(path: &Path, config: &Config) -> Result<ExitCode, CliError> {
    let (dataset, availability) = load(path, config)?;
    println!("{}", DatasetStats::collect(&dataset, &availability));
    Ok(ExitCode::SUCCESS)
}
