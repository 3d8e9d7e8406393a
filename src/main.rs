mod manager;

use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate one encoding and print the report.
    Evaluate {
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        encoding: Vec<f64>,
    },

    /// Evaluate one encoding repeatedly and print summary statistics.
    Test {
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        encoding: Vec<f64>,

        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        runs: u64,
    },
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mgr = Manager::new(&args.config).context("failed to construct mgr")?;

    match args.command {
        Command::Evaluate { encoding } => mgr.evaluate(&encoding)?,
        Command::Test { encoding, runs } => mgr.test(&encoding, runs as usize)?,
    }

    Ok(())
}
