//! icalfeed CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use icalfeed_cli::cli::{Cli, Command, ConfigAction};
use icalfeed_cli::commands;
use icalfeed_cli::config::{CliConfig, Settings};
use icalfeed_cli::error::CliResult;
use icalfeed_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let config = match cli.config {
        Some(ref path) => CliConfig::load_from(path),
        None => CliConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize tracing
    let tracing_config = if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: CliConfig) -> CliResult<()> {
    match cli.command {
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Path => commands::config::path(),
        },
        None => {
            let settings = Settings::resolve(&cli, config);
            commands::ingest::run(&settings).await
        }
    }
}
