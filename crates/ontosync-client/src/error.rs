//! Error types for the sync engine
//!
//! Every failure the engine surfaces maps onto one of three domain categories
//! (network, parse, database sync) or one of the ambient infrastructure
//! variants. Messages are written for the person running the client.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Code carried by [`SyncError::DbSync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbSyncCode {
    /// At least one shard's streamed row count disagreed with the manifest
    Mismatch,
}

impl DbSyncCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DbSyncCode::Mismatch => "SYNC_DB_MISMATCH",
        }
    }
}

impl std::fmt::Display for DbSyncCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comprehensive error type for the engine
#[derive(Error, Debug)]
pub enum SyncError {
    /// Manifest, shard or status request failed (transport or HTTP status)
    #[error("Network request to '{url}' failed: {message}. Check your connection and the configured URLs.")]
    Network { url: String, message: String },

    /// A remote document or shard could not be decoded
    #[error("Failed to parse {context}: {message}")]
    Parse { context: String, message: String },

    /// The local store was left inconsistent with the manifest
    #[error("Database sync failed: {0}. Coded data is unavailable until a sync completes.")]
    DbSync(DbSyncCode),

    /// Local store operation failed
    #[error("Local store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Local store schema could not be migrated
    #[error("Local store migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Bearer token could not be obtained
    #[error("Failed to obtain an access token: {0}")]
    Token(String),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your config file or ONTOSYNC_* environment variables.")]
    Config(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn network(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Network {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn token(msg: impl Into<String>) -> Self {
        Self::Token(msg.into())
    }

    /// The `SYNC_DB_MISMATCH` error raised after a failed shard sync.
    pub fn mismatch() -> Self {
        Self::DbSync(DbSyncCode::Mismatch)
    }

    pub fn is_db_mismatch(&self) -> bool {
        matches!(self, Self::DbSync(DbSyncCode::Mismatch))
    }
}
