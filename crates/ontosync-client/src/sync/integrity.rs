//! Local counts against the manifest

use crate::error::Result;
use crate::store::LocalStore;
use futures::future::try_join_all;
use ontosync_common::Manifest;
use serde::Serialize;
use tracing::{debug, instrument};

/// Expected against stored count for one shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardCheck {
    pub ontology_id: String,
    pub expected: u64,
    pub actual: u64,
}

impl ShardCheck {
    pub fn matches(&self) -> bool {
        self.expected == self.actual
    }
}

/// Per-shard comparison of the local store with a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub shards: Vec<ShardCheck>,
}

impl IntegrityReport {
    /// Every shard matches; an empty manifest is in sync.
    pub fn is_in_sync(&self) -> bool {
        self.shards.iter().all(ShardCheck::matches)
    }

    /// Shards whose stored count differs from the declared one.
    pub fn drifted(&self) -> impl Iterator<Item = &ShardCheck> {
        self.shards.iter().filter(|check| !check.matches())
    }
}

/// Count the stored codes of every manifest entry concurrently.
#[instrument(skip_all, fields(shards = manifest.files.len()))]
pub async fn check_integrity(store: &LocalStore, manifest: &Manifest) -> Result<IntegrityReport> {
    let counts = try_join_all(
        manifest
            .files
            .iter()
            .map(|entry| store.count_codes(&entry.ontology_id)),
    )
    .await?;

    let shards: Vec<ShardCheck> = manifest
        .files
        .iter()
        .zip(counts)
        .map(|(entry, actual)| ShardCheck {
            ontology_id: entry.ontology_id.clone(),
            expected: entry.num_codes,
            actual,
        })
        .collect();

    let report = IntegrityReport { shards };
    debug!(
        in_sync = report.is_in_sync(),
        drifted = report.drifted().count(),
        "Integrity check complete"
    );
    Ok(report)
}
