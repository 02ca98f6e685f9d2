//! CLI entry point for the lifetime sequencer.
//!
//! # Usage
//!
//! ```bash
//! lifetime sample42                              # bench profile, config/lifetime.toml
//! lifetime sample42 --config config/lifetime_srq.toml
//! lifetime dry-run --simulate --repetitions 3    # simulated instruments
//! ```
//!
//! The acquisition runs on a blocking worker while the console reads commands
//! from stdin on its own thread. The console thread is abandoned once the
//! acquisition finishes.

use anyhow::Context;
use chrono::Local;
use clap::error::ErrorKind;
use clap::Parser;
use lifetime_daq::adapters::DeviceOpener;
use lifetime_daq::commander::Commander;
use lifetime_daq::config::{LifetimeConfig, DEFAULT_CONFIG_PATH};
use lifetime_daq::data::ExperimentDir;
use lifetime_daq::experiment::AcquisitionEngine;
use lifetime_daq::logging::{self, LoggingConfig};
use lifetime_daq::run_state::RunState;
use std::io;
use std::path::PathBuf;
use tracing::{error, info, warn, Level};

const EXIT_OK: i32 = 0;
const EXIT_USAGE: i32 = -1;
const EXIT_DIRECTORY: i32 = -2;
const EXIT_CONFIG: i32 = -3;
const EXIT_ACQUISITION: i32 = -4;

#[derive(Parser, Debug)]
#[command(name = "lifetime")]
#[command(about = "Lifetime-decay measurement sequencer", version, long_about = None)]
struct Cli {
    /// Experiment name, appended to the output directory name
    experiment: String,

    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use simulated instruments
    #[arg(long)]
    simulate: bool,

    /// Override the number of repetitions
    #[arg(long)]
    repetitions: Option<u32>,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            std::process::exit(EXIT_OK);
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(EXIT_USAGE);
        }
    };

    std::process::exit(run(cli).await);
}

fn load_config(cli: &Cli) -> anyhow::Result<LifetimeConfig> {
    let mut config = LifetimeConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if cli.simulate {
        config = config.with_simulated_instruments();
    }
    if let Some(repetitions) = cli.repetitions {
        config.acquisition.repetitions = repetitions;
    }
    config.validate().context("validating configuration")?;
    Ok(config)
}

async fn run(cli: Cli) -> i32 {
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            let _ = logging::init(LoggingConfig::new(Level::INFO));
            error!("invalid configuration: {e:#}");
            return EXIT_CONFIG;
        }
    };
    if let Err(e) = logging::init_from_config(&config) {
        let _ = logging::init(LoggingConfig::default());
        warn!("unable to initialise logging ({e}), using defaults");
    }

    let started = Local::now();
    let dir = match ExperimentDir::create(&config.storage.output_root, &cli.experiment, &started) {
        Ok(dir) => dir,
        Err(e) => {
            error!(error = %e, "unable to create experiment directory");
            return EXIT_DIRECTORY;
        }
    };

    let run_state = RunState::new();

    let console_state = run_state.clone();
    let console = std::thread::Builder::new()
        .name("commander".into())
        .spawn(move || {
            let commander = Commander::new(io::stdin().lock(), io::stdout(), console_state);
            if let Err(e) = commander.run() {
                warn!(error = %e, "console stopped");
            }
        });
    if let Err(e) = console {
        warn!(error = %e, "console unavailable, run cannot be stopped interactively");
    }

    let experiment = cli.experiment.clone();
    let worker = tokio::task::spawn_blocking(move || {
        let opener = DeviceOpener::new();
        AcquisitionEngine::new(config, experiment, dir, run_state).run(&opener)
    });

    let code = match worker.await {
        Ok(Ok(report)) => {
            info!(
                repetitions = report.records.len(),
                stopped_early = report.stopped_early,
                "done"
            );
            EXIT_OK
        }
        Ok(Err(e)) => {
            error!(error = %e, "acquisition failed");
            EXIT_ACQUISITION
        }
        Err(e) => {
            error!(error = %e, "acquisition worker panicked");
            EXIT_ACQUISITION
        }
    };
    println!();
    code
}
