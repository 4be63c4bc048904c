//! `ontosync version-check` command implementation

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::Result;
use crate::store::LocalStore;
use crate::sync::{VersionCheck, VersionGuard};
use colored::Colorize;

/// Run the startup version check and report what was invalidated.
pub async fn run(config: &Config) -> Result<()> {
    let store = LocalStore::open(&config.database_path).await?;
    let api = ApiClient::from_config(config)?;

    let report = VersionGuard::from_config(api, store, config)?.check().await?;
    print_report(&report);

    Ok(())
}

pub(crate) fn print_report(report: &VersionCheck) {
    if !report.backend_ok {
        println!("{} Backend is not ready; version check skipped", "!".yellow());
        return;
    }

    let current = report
        .current
        .as_ref()
        .map(|v| format!("{} (client {})", v.backend, v.client))
        .unwrap_or_default();

    if !report.upgraded {
        println!("{} Version unchanged: {}", "✓".green(), current);
        return;
    }

    match &report.previous {
        Some(previous) => println!(
            "{} Version changed: {} (client {}) -> {}",
            "→".cyan(),
            previous.backend,
            previous.client,
            current
        ),
        None => println!("{} First run on {}", "→".cyan(), current),
    }
    println!("  Local cache cleared");
    if report.coded_data_cleared {
        println!("  {}", "Release channel changed; coded data cleared".yellow());
    }
}
