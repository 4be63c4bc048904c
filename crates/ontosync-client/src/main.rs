//! ontosync - Main entry point

use clap::Parser;
use colored::Colorize;
use ontosync_client::{commands, Cli, Commands, Config};
use ontosync_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("ontosync")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok();

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        if e.is_db_mismatch() {
            eprintln!(
                "{}",
                "Coded data is incomplete; features that depend on it stay unavailable until 'ontosync sync' succeeds."
                    .yellow()
            );
        }
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> ontosync_client::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Sync {
            skip_version_check,
            write_mode,
        } => commands::sync::run(&config, *skip_version_check, *write_mode).await,
        Commands::Check => commands::check::run(&config).await,
        Commands::VersionCheck => commands::version::run(&config).await,
        Commands::Status => commands::status::run(&config).await,
        Commands::Reset { yes } => commands::reset::run(&config, *yes).await,
    }
}
