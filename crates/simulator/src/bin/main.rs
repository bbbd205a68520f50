//! Ressim Simulator CLI
//!
//! Run deterministic resource-sharing scenarios.
//!
//! # Example
//!
//! ```bash
//! # Print a sample scenario, edit it, run it with a fixed seed
//! ressim-sim sample > scenario.toml
//! ressim-sim run scenario.toml --seed 42 --duration 120
//!
//! # Check that lazy and full updates agree on a scenario
//! ressim-sim compare scenario.toml
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use ressim_simulator::{compare_algorithms, ScenarioConfig, Simulator};
use ressim_types::UpdateAlgorithm;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ressim Simulator
///
/// Runs deterministic resource-sharing simulations. Single-threaded,
/// reproducible when the same seed is used.
#[derive(Parser, Debug)]
#[command(name = "ressim-sim")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario and print its report
    Run {
        /// Scenario file. The built-in sample is used when omitted.
        scenario: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,

        /// Update algorithm for every model (lazy, full)
        #[arg(long, value_parser = parse_algorithm)]
        algorithm: Option<UpdateAlgorithm>,

        /// Keep running after the duration until all work has ended
        #[arg(long)]
        drain: bool,
    },

    /// Run a scenario under both update algorithms and compare finish dates
    Compare {
        /// Scenario file. The built-in sample is used when omitted.
        scenario: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the sample scenario as TOML
    Sample,
}

#[derive(clap::Args, Debug)]
struct Overrides {
    /// Random seed for the workload. When omitted, the scenario's seed is used.
    #[arg(long)]
    seed: Option<u64>,

    /// Simulated seconds during which work arrives
    #[arg(short = 'd', long)]
    duration: Option<f64>,
}

fn parse_algorithm(s: &str) -> Result<UpdateAlgorithm, String> {
    match s.to_lowercase().as_str() {
        "lazy" => Ok(UpdateAlgorithm::Lazy),
        "full" => Ok(UpdateAlgorithm::Full),
        _ => Err(format!("Unknown update algorithm: {}", s)),
    }
}

fn load(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<ScenarioConfig> {
    let mut config = match path {
        Some(path) => ScenarioConfig::load(path)
            .with_context(|| format!("Failed to load scenario {}", path.display()))?,
        None => ScenarioConfig::sample(),
    };
    if let Some(seed) = overrides.seed {
        config = config.with_seed(seed);
    }
    if let Some(duration) = overrides.duration {
        config = config.with_duration(duration);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sample => {
            // No tracing here: output goes to stdout
            print!("{}", ScenarioConfig::sample().to_toml()?);
        }

        Commands::Run {
            scenario,
            overrides,
            algorithm,
            drain,
        } => {
            init_tracing();
            let mut config = load(scenario.as_deref(), &overrides)?;
            if let Some(algorithm) = algorithm {
                config = config.with_algorithm(algorithm);
            }
            if drain {
                config = config.with_drain(true);
            }

            info!(
                seed = config.seed,
                duration = config.duration,
                cpu = %config.kernel.cpu_algorithm,
                network = %config.kernel.network_algorithm,
                storage = %config.kernel.storage_algorithm,
                "Starting simulation"
            );
            let report = Simulator::new(config)?.run();
            report.print_summary();
        }

        Commands::Compare {
            scenario,
            overrides,
        } => {
            init_tracing();
            let config = load(scenario.as_deref(), &overrides)?;
            info!(seed = config.seed, duration = config.duration, "Comparing algorithms");
            let comparison = compare_algorithms(&config)?;
            comparison.print_summary();
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
