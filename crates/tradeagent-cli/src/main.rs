//! tradeagent - Entry Point

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tradeagent_cli::{AppConfig, Application};
use tradeagent_telemetry::LogFormat;

/// Real-time channel client and hub
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TRADEAGENT_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to a hub and forward stdin lines as messages
    Connect,
    /// Run the hub server; stdin lines are broadcast, `@user msg` is personal
    Serve,
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    tradeagent_ws::init_crypto();

    let args = Args::parse();

    // Determine config path: CLI arg > TRADEAGENT_CONFIG env var > default
    let (config_path, required) = AppConfig::resolve_path(args.config);
    let config = AppConfig::load(&config_path, required)?;

    if let Command::Config = args.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    tradeagent_telemetry::init_logging(&config.telemetry.log_level, LogFormat::from_env())?;
    info!(config_path = %config_path, "Starting tradeagent v{}", env!("CARGO_PKG_VERSION"));

    let app = Application::new(config);
    match args.command {
        Command::Connect => app.run_client().await?,
        Command::Serve => app.run_hub().await?,
        Command::Config => {}
    }

    Ok(())
}
