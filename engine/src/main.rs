// PT coaching assistant
// Main entry point for the pt binary

use clap::Parser;
use pt_engine::cli::{Cli, Command};
use pt_engine::config::Config;
use pt_engine::handlers::{
    handle_chat, handle_doctor, handle_history, handle_serve, OutputFormat,
};
use pt_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let loaded = match &cli.config {
        Some(config_path) => Config::load_or_create_at(config_path),
        None => Config::load_or_create(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            init_telemetry();
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // --log wins over the config file; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::info!("PT v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve { bind } => {
            tracing::info!("Starting API server...");
            handle_serve(bind, &config).await
        }

        Command::Chat {
            first_name,
            last_name,
            model,
        } => handle_chat(first_name, last_name, model, &config, format).await,

        Command::History {
            first_name,
            last_name,
            limit,
        } => {
            tracing::info!("Showing last {} exchanges", limit);
            handle_history(first_name, last_name, limit, &config, format).await
        }

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
