//! CLI for Cadence
//!
//! Small drivers that exercise the measurement and tuning layers:
//! - spawn: instrumented thread creation and the resulting task graph
//! - tune: the tuning context protocol against the built-in search policy
//! - activity: async activity bucketing

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence - measurement and autotuning for threaded runtimes", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn instrumented workers and report timers and tasks
    Spawn(commands::spawn::SpawnArgs),

    /// Drive tuning contexts against the built-in policy
    Tune(commands::tune::TuneArgs),

    /// Bucket a synthetic mix of asynchronous activity
    Activity(commands::activity::ActivityArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Spawn(args) => commands::spawn::run(args),
        Commands::Tune(args) => commands::tune::run(args),
        Commands::Activity(args) => commands::activity::run(args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
