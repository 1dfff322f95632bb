//! ipscope CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod config;
mod handlers;
mod history;

use commands::{CacheCommands, Commands, ConfigCommands};
use config::CliConfig;

#[derive(Parser)]
#[command(name = "ipscope")]
#[command(author, version, about = "Public IP viewer with an offline cache", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = CliConfig::load().unwrap_or_default();

    match cli.command {
        Commands::Show => handlers::show(&config).await?,
        Commands::Check => handlers::check(&config).await?,
        Commands::Watch { interval } => handlers::watch(&config, interval).await?,
        Commands::History { clear } => handlers::history(&config, clear)?,
        Commands::Cache { command } => match command {
            CacheCommands::Version => handlers::cache_version(&config).await?,
            CacheCommands::List => handlers::list_cache(&config).await?,
            CacheCommands::Clear => handlers::clear_cache(&config).await?,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }

    Ok(())
}
