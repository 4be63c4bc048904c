//! Startup version check and cache invalidation
//!
//! The stored `(backend, client)` pair is compared with the running pair. Any
//! difference wipes the generic cache; a change of release channel also wipes
//! the coded data, since shards of different channels are not compatible.

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::store::LocalStore;
use ontosync_common::StoredVersion;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// What a version check found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionCheck {
    /// Backend reported `status == "ok"`
    pub backend_ok: bool,
    pub upgraded: bool,
    pub coded_data_cleared: bool,
    pub previous: Option<StoredVersion>,
    /// Running pair; `None` when the backend was not ok
    pub current: Option<StoredVersion>,
    /// Transient cache keys that were present and removed
    pub transient_removed: usize,
}

/// Compares stored and running versions and invalidates local state.
#[derive(Clone)]
pub struct VersionGuard {
    api: ApiClient,
    store: LocalStore,
    status_url: String,
    client_version: String,
    transient_keys: Vec<String>,
}

impl VersionGuard {
    pub fn new(
        api: ApiClient,
        store: LocalStore,
        status_url: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Self {
        Self {
            api,
            store,
            status_url: status_url.into(),
            client_version: client_version.into(),
            transient_keys: Vec::new(),
        }
    }

    pub fn from_config(api: ApiClient, store: LocalStore, config: &Config) -> Result<Self> {
        Ok(Self::new(api, store, config.status_url()?, config.client_version.clone())
            .with_transient_keys(config.transient_keys.clone()))
    }

    /// Cache keys removed on every check.
    pub fn with_transient_keys(mut self, keys: Vec<String>) -> Self {
        self.transient_keys = keys;
        self
    }

    #[instrument(skip(self), fields(status_url = %self.status_url, client = %self.client_version))]
    pub async fn check(&self) -> Result<VersionCheck> {
        let mut report = VersionCheck {
            transient_removed: self.remove_transient_keys().await?,
            ..VersionCheck::default()
        };

        let status = self.api.backend_status(&self.status_url).await?;
        if !status.is_ok() {
            warn!(status = %status.status, "Backend not ready, skipping version check");
            return Ok(report);
        }
        report.backend_ok = true;

        let current = StoredVersion::new(status.version, self.client_version.clone());
        let previous = self.previous_version().await?;

        let upgrade = match &previous {
            Some(previous) => !previous.is_complete() || *previous != current,
            None => true,
        };

        if upgrade {
            // no record reads as an empty backend version on no channel
            let previous_channel = previous.as_ref().map_or("", StoredVersion::channel);
            let channel_changed = previous_channel != current.channel();

            let removed = self.store.kv_clear().await?;
            if channel_changed {
                self.store.clear_coded_data().await?;
            }
            self.store.set_stored_version(&current).await?;

            info!(
                previous = ?previous,
                backend = %current.backend,
                cache_entries = removed,
                coded_data_cleared = channel_changed,
                "Version changed, local cache invalidated"
            );

            report.upgraded = true;
            report.coded_data_cleared = channel_changed;
        } else {
            debug!("Stored version is current");
        }

        report.previous = previous;
        report.current = Some(current);
        Ok(report)
    }

    /// An unreadable record counts as no record.
    async fn previous_version(&self) -> Result<Option<StoredVersion>> {
        match self.store.stored_version().await {
            Ok(version) => Ok(version),
            Err(SyncError::Parse { message, .. }) => {
                warn!(error = %message, "Stored version record is unreadable");
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    async fn remove_transient_keys(&self) -> Result<usize> {
        let mut removed = 0;
        for key in &self.transient_keys {
            if self.store.kv_remove(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
