use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use icc_store::Backend;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "icc", about = "Drive the icc notification and applause backend")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Redis connection string (overrides the config file)
    #[arg(long, global = true)]
    redis_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait until Redis answers
    Wait,
    /// Append a notification to the stream
    Publish(commands::publish::PublishArgs),
    /// Print notifications as they arrive
    Listen(commands::listen::ListenArgs),
    /// Record, count and clean up applause
    Applause(commands::applause::ApplauseArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store_config = config::load(cli.config.as_deref(), cli.redis_url)?;
    let backend = Backend::connect(store_config)?;

    match cli.command {
        Commands::Wait => commands::wait::run(&backend).await,
        Commands::Publish(args) => commands::publish::run(&backend, args).await,
        Commands::Listen(args) => commands::listen::run(&backend, args).await,
        Commands::Applause(args) => commands::applause::run(&backend, args).await,
    }
}
