//! Client configuration
//!
//! Loaded once at startup (JSON file, then `.env`, then `ONTOSYNC_*`
//! environment variables) and handed to the engine explicitly.

use crate::api::endpoints;
use crate::error::{Result, SyncError};
use crate::sync::ShardWriteMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "ontosync.json";

/// Default timeout for remote requests in seconds. Shards are several
/// megabytes, so this is generous.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

/// Cache keys dropped on every startup check.
pub const DEFAULT_TRANSIENT_KEYS: &[&str] = &["__welcome__tour_seen"];

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// GraphQL endpoints of the backend; the first one locates the status endpoint
    #[serde(default)]
    pub graphql_endpoints: Vec<String>,

    /// Base URL serving `manifest.json` and the shard files
    #[serde(default)]
    pub assets_url: Option<String>,

    /// SQLite database holding the local replica
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,

    /// Bearer token used when no token provider is wired in
    #[serde(default)]
    pub dev_token: Option<String>,

    /// Build identifier of this client, compared by the version guard
    #[serde(default = "default_client_version")]
    pub client_version: String,

    #[serde(default)]
    pub write_mode: ShardWriteMode,

    #[serde(default = "default_transient_keys")]
    pub transient_keys: Vec<String>,
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("ontosync"))
        .unwrap_or_else(|| PathBuf::from(".ontosync"))
        .join("ontosync.db")
}

fn default_api_timeout_secs() -> u64 {
    DEFAULT_API_TIMEOUT_SECS
}

fn default_client_version() -> String {
    option_env!("ONTOSYNC_BUILD_ID")
        .unwrap_or(env!("CARGO_PKG_VERSION"))
        .trim()
        .to_string()
}

fn default_transient_keys() -> Vec<String> {
    DEFAULT_TRANSIENT_KEYS.iter().map(|k| k.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graphql_endpoints: Vec::new(),
            assets_url: None,
            database_path: default_database_path(),
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            dev_token: None,
            client_version: default_client_version(),
            write_mode: ShardWriteMode::default(),
            transient_keys: default_transient_keys(),
        }
    }
}

impl Config {
    /// Load configuration for a run.
    ///
    /// An explicit `path` must exist. Without one, `ontosync.json` in the
    /// working directory is used when present. Environment overrides are
    /// applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            },
            None => Self::default(),
        };

        config.merge_env()
    }

    /// Parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!("Cannot read config file '{}': {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| SyncError::config(format!("Invalid config file: {}", e)))
    }

    /// Apply `ONTOSYNC_*` environment overrides.
    pub fn merge_env(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var("ONTOSYNC_ASSETS_URL") {
            self.assets_url = Some(url);
        }

        if let Ok(endpoint) = std::env::var("ONTOSYNC_GRAPHQL_ENDPOINT") {
            self.graphql_endpoints = vec![endpoint];
        }

        if let Ok(path) = std::env::var("ONTOSYNC_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }

        if let Ok(token) = std::env::var("ONTOSYNC_TOKEN") {
            self.dev_token = Some(token);
        }

        if let Ok(secs) = std::env::var("ONTOSYNC_API_TIMEOUT_SECS") {
            self.api_timeout_secs = secs.parse().map_err(|_| {
                SyncError::config(format!("ONTOSYNC_API_TIMEOUT_SECS is not a number: '{}'", secs))
            })?;
        }

        if let Ok(mode) = std::env::var("ONTOSYNC_WRITE_MODE") {
            self.write_mode = mode.parse()?;
        }

        Ok(self)
    }

    /// Base URL of the shard assets.
    pub fn assets_url(&self) -> Result<&str> {
        self.assets_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| SyncError::config("No assets URL configured (assets_url)"))
    }

    /// Backend status URL derived from the primary GraphQL endpoint.
    pub fn status_url(&self) -> Result<String> {
        self.graphql_endpoints
            .first()
            .map(|endpoint| endpoints::status_url(endpoint))
            .ok_or_else(|| SyncError::config("No GraphQL endpoint configured (graphql_endpoints)"))
    }
}
