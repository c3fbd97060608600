//! Flow simulator command line
//!
//! Loads a model description, runs it and prints the run report as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Run until no events are pending
//! flowsim --model model.json
//!
//! # Stop the clock after one simulated hour
//! flowsim --model model.json --until 3600
//!
//! # Trace every queue movement
//! flowsim --model model.json --log-level trace
//! ```

use clap::Parser;
use flow_simulator_core_rs::{ModelConfig, SimError, Simulation};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

/// Run a process-flow model and print its report
#[derive(Parser)]
#[command(name = "flowsim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Model description (JSON)
    #[arg(short, long)]
    model: PathBuf,

    /// Stop after this many simulated seconds
    #[arg(short, long)]
    until: Option<f64>,

    /// Log level used when RUST_LOG is not set
    #[arg(short, long, default_value = "warn")]
    log_level: log::LevelFilter,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .parse_default_env()
        .init();

    let mut sim = match load(&cli) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    let outcome = match cli.until {
        Some(secs) => sim.run_until_seconds(secs),
        None => sim.run(),
    };
    if let Err(e) = &outcome {
        log::error!("Run stopped: {}", e);
    }

    match sim.report().and_then(|report| report.to_json()) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    }

    if outcome.is_err() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

fn load(cli: &Cli) -> Result<Simulation, SimError> {
    let json = fs::read_to_string(&cli.model)
        .map_err(|e| SimError::InvalidConfig(format!("{}: {}", cli.model.display(), e)))?;
    let config = ModelConfig::from_json(&json)?;
    let mut sim = Simulation::from_config(&config)?;
    sim.start()?;
    Ok(sim)
}
