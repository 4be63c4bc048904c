//! `ontosync check` command implementation
//!
//! Compares local code counts with the remote manifest without syncing.

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::Result;
use crate::progress::{create_spinner, format_count};
use crate::store::LocalStore;
use crate::sync::SyncEngine;
use colored::Colorize;

pub async fn run(config: &Config) -> Result<()> {
    let store = LocalStore::open(&config.database_path).await?;
    let api = ApiClient::from_config(config)?;
    let engine = SyncEngine::from_config(api, store, config)?;

    let spinner = create_spinner("Fetching manifest...");
    let report = engine.check().await;
    spinner.finish_and_clear();
    let report = report?;

    if report.shards.is_empty() {
        println!("Manifest lists no shards.");
        return Ok(());
    }

    println!("{}", "Shards:".cyan().bold());
    for shard in &report.shards {
        let marker = if shard.matches() { "✓".green() } else { "✗".red() };
        println!(
            "  {} {:<24} {:>12} / {}",
            marker,
            shard.ontology_id,
            format_count(shard.actual),
            format_count(shard.expected)
        );
    }
    println!();

    let drifted = report.drifted().count();
    if drifted == 0 {
        println!("{} Local replica is in sync", "✓".green());
    } else {
        println!(
            "{} {} shard(s) out of sync. Run 'ontosync sync' to update.",
            "!".yellow(),
            drifted
        );
    }

    Ok(())
}
