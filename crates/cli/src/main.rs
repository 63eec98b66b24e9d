//! Emissions Controller Command Line Interface
//!
//! Runs reward distribution scenarios against the emissions engine and prints
//! the resulting reports as JSON.

mod scenario;
mod settings;
mod simulation;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emissions_types::FIXED_POINT_SCALE;
use scenario::Scenario;
use serde_json::json;
use settings::Settings;
use simulation::Simulation;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "emissions-cli")]
#[command(about = "Emissions Controller Command Line Interface", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (TOML); `EMISSIONS_*` environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file and print every step's outcome
    Simulate {
        /// Scenario file (TOML)
        #[arg(long)]
        scenario: PathBuf,
        /// Abort on the first failing step instead of recording it
        #[arg(long)]
        strict: bool,
        /// Write the final controller state as a JSON snapshot
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
    },
    /// Print the configured parameters and the derived per-epoch reward
    Params,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_logging(&settings);

    match cli.command {
        Commands::Simulate {
            scenario,
            strict,
            snapshot_out,
        } => simulate(&settings, &scenario, strict, snapshot_out),
        Commands::Params => {
            let params = &settings.params;
            let epoch_reward = params.epoch_reward();
            let json = json!({
                "params": params,
                "epoch_reward": epoch_reward.to_string(),
                "epoch_reward_tokens": (epoch_reward / FIXED_POINT_SCALE).to_string(),
                "undistributable_remainder": (params.total_reward_budget
                    - epoch_reward * params.total_epochs as u128)
                    .to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
    }
}

fn simulate(
    settings: &Settings,
    scenario_path: &Path,
    strict: bool,
    snapshot_out: Option<PathBuf>,
) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    tracing::info!(
        scenario = %scenario_path.display(),
        dials = scenario.dials.len(),
        steps = scenario.steps.len(),
        "running scenario"
    );

    let simulation = Simulation::new(settings.params.clone(), &scenario)?;
    let output = simulation.run(&scenario.steps, strict)?;

    if let Some(path) = snapshot_out {
        output
            .snapshot
            .save_json(&path)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        tracing::info!(path = %path.display(), "snapshot written");
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_logging(settings: &Settings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    // Logs go to stderr so stdout stays clean JSON.
    if settings.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}
