//! `ontosync sync` command implementation
//!
//! Runs the version check, then syncs the local replica with a progress bar.

use crate::api::ApiClient;
use crate::commands::version::print_report;
use crate::config::Config;
use crate::error::Result;
use crate::progress::{create_sync_progress, format_count};
use crate::store::LocalStore;
use crate::sync::{ShardWriteMode, SyncEngine, SyncOutcome, VersionGuard};
use colored::Colorize;

pub async fn run(
    config: &Config,
    skip_version_check: bool,
    write_mode: Option<ShardWriteMode>,
) -> Result<()> {
    let store = LocalStore::open(&config.database_path).await?;
    let api = ApiClient::from_config(config)?;

    if !skip_version_check {
        let guard = VersionGuard::from_config(api.clone(), store.clone(), config)?;
        print_report(&guard.check().await?);
    }

    let pb = create_sync_progress("Syncing local replica");
    let bar = pb.clone();
    let engine = SyncEngine::from_config(api, store, config)?
        .with_write_mode(write_mode.unwrap_or(config.write_mode))
        .with_progress(move |percent| bar.set_position(u64::from(percent)));

    let outcome = engine.run().await;
    match &outcome {
        Ok(_) => pb.finish_and_clear(),
        Err(_) => pb.abandon(),
    }

    match outcome? {
        SyncOutcome::UpToDate { shards } => {
            println!("{} Local replica is up to date ({} shard(s))", "✓".green(), shards);
        },
        SyncOutcome::Synced { shards } => {
            for shard in &shards {
                println!(
                    "{} {} ({} codes)",
                    "✓".green(),
                    shard.ontology_id,
                    format_count(shard.persisted)
                );
            }
            let total: u64 = shards.iter().map(|shard| shard.persisted).sum();
            println!("{} Synced {} codes", "✓".green(), format_count(total));
        },
    }

    Ok(())
}
