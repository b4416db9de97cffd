//! Splice CLI entry point.

use anyhow::Result;
use clap::Parser;
use splice::cli::{commands, Cli, Commands};
use splice::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.as_deref();
    let settings = Settings::load_from(config_path)?;

    // Initialize logging. Always stderr: the worker's stdout is the protocol.
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("splice={}", log_level)),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match &cli.command {
        Commands::Chat => {
            commands::run_chat(&settings, config_path).await?;
        }

        Commands::Run { intent } => {
            commands::run_intent(intent, &settings, config_path).await?;
        }

        Commands::Tools => {
            commands::run_tools(&settings, config_path).await?;
        }

        Commands::Call { tool, args } => {
            commands::run_call(tool, args, &settings, config_path).await?;
        }

        Commands::Worker { output_dir } => {
            commands::run_worker(output_dir.clone(), &settings).await?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings, config_path)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, &settings, config_path)?;
        }
    }

    Ok(())
}
