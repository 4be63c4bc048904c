//! Local replica synchronization
//!
//! [`SyncEngine::run`] fetches the manifest, compares it with the local store
//! and, when they disagree, clears the coded data and re-ingests every shard
//! concurrently. [`VersionGuard`] runs before it at startup.

pub mod csv_stream;
pub mod decode;
pub mod integrity;
pub mod ontology;
pub mod progress;
pub mod shard;
pub mod version;

pub use integrity::{check_integrity, IntegrityReport, ShardCheck};
pub use progress::{ProgressCallback, ProgressReporter};
pub use shard::{ShardOutcome, ShardPipeline};
pub use version::{VersionCheck, VersionGuard};

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::store::LocalStore;
use futures::future::try_join_all;
use ontosync_common::Manifest;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// When shard rows are written relative to count validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardWriteMode {
    /// Rows are written while the shard is still being counted. A shard that
    /// fails its count may leave rows behind.
    #[default]
    Streaming,
    /// Rows are held until the count is confirmed; a failing shard writes nothing.
    VerifiedFirst,
}

impl FromStr for ShardWriteMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "streaming" => Ok(Self::Streaming),
            "verified_first" => Ok(Self::VerifiedFirst),
            other => Err(SyncError::config(format!(
                "Unknown write mode '{}' (expected 'streaming' or 'verified_first')",
                other
            ))),
        }
    }
}

/// How a sync run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local counts already matched the manifest; nothing was downloaded
    UpToDate { shards: usize },
    Synced { shards: Vec<ShardOutcome> },
}

impl SyncOutcome {
    /// Codes written by this run.
    pub fn codes_written(&self) -> u64 {
        match self {
            SyncOutcome::UpToDate { .. } => 0,
            SyncOutcome::Synced { shards } => shards.iter().map(|s| s.persisted).sum(),
        }
    }
}

/// Keeps the local coded-data store consistent with the remote manifest.
#[derive(Clone)]
pub struct SyncEngine {
    api: ApiClient,
    store: LocalStore,
    assets_url: String,
    mode: ShardWriteMode,
    progress: Option<ProgressCallback>,
}

impl SyncEngine {
    pub fn new(api: ApiClient, store: LocalStore, assets_url: impl Into<String>) -> Self {
        Self {
            api,
            store,
            assets_url: assets_url.into(),
            mode: ShardWriteMode::default(),
            progress: None,
        }
    }

    pub fn from_config(api: ApiClient, store: LocalStore, config: &Config) -> Result<Self> {
        Ok(Self::new(api, store, config.assets_url()?).with_write_mode(config.write_mode))
    }

    pub fn with_write_mode(mut self, mode: ShardWriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Receive progress percentages while shards are ingested.
    pub fn with_progress(mut self, callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Fetch the manifest with a fresh token.
    pub async fn manifest(&self) -> Result<(Manifest, String)> {
        let token = self.api.token().await?;
        let manifest = self.api.fetch_manifest(&self.assets_url, &token).await?;
        Ok((manifest, token))
    }

    /// Compare local counts with the current manifest without syncing.
    pub async fn check(&self) -> Result<IntegrityReport> {
        let (manifest, _) = self.manifest().await?;
        check_integrity(&self.store, &manifest).await
    }

    /// Bring the local store in line with the manifest.
    ///
    /// Fails with `SYNC_DB_MISMATCH` when any shard's row count disagrees with
    /// the manifest. Transport and decoding errors abort the run with the first
    /// error raised.
    #[instrument(skip(self), fields(assets_url = %self.assets_url, mode = ?self.mode))]
    pub async fn run(&self) -> Result<SyncOutcome> {
        let (manifest, token) = self.manifest().await?;

        let report = check_integrity(&self.store, &manifest).await?;
        if report.is_in_sync() {
            info!(shards = manifest.files.len(), "Local replica is up to date");
            return Ok(SyncOutcome::UpToDate {
                shards: manifest.files.len(),
            });
        }

        let progress = ProgressReporter::new(manifest.total_codes(), self.progress.clone());
        progress.start();

        self.store.clear_coded_data().await?;

        let pipeline = ShardPipeline {
            api: &self.api,
            store: &self.store,
            base_url: &self.assets_url,
            token: &token,
            mode: self.mode,
            progress: &progress,
        };

        info!(
            shards = manifest.files.len(),
            total_codes = manifest.total_codes(),
            "Syncing local replica"
        );
        let shards = try_join_all(manifest.files.iter().map(|entry| pipeline.run(entry))).await?;

        let failed: Vec<&str> = shards
            .iter()
            .filter(|shard| !shard.succeeded())
            .map(|shard| shard.ontology_id.as_str())
            .collect();
        if !failed.is_empty() {
            warn!(failed = ?failed, "Shard counts disagree with the manifest");
            return Err(SyncError::mismatch());
        }

        progress.complete();
        info!(codes = progress.persisted(), "Local replica synced");
        Ok(SyncOutcome::Synced { shards })
    }
}
