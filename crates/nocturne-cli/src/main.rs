mod commands;
mod summary;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nocturne_core::config::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nocturne", about = "Nightly CCD image reduction pipeline")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, default_value = "nocturne.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce one night of raw frames
    Night(commands::night::NightArgs),
    /// Reduce every night in a date range
    Range(commands::range::RangeArgs),
    /// Build master calibration frames for one night without reducing
    Masters(commands::masters::MastersArgs),
    /// Print or save a default configuration
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.is_file() {
        Config::load(&cli.config)
            .with_context(|| format!("Failed to load config {}", cli.config.display()))?
    } else {
        Config::example()
    };

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if !cli.config.is_file() {
        tracing::debug!(file = %cli.config.display(), "no config file, using built-in defaults");
    }

    match &cli.command {
        Commands::Night(args) => commands::night::run(args, &config),
        Commands::Range(args) => commands::range::run(args, &config),
        Commands::Masters(args) => commands::masters::run(args, &config),
        Commands::Config(args) => commands::config::run(args),
    }
}
