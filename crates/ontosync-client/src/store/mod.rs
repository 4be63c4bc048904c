//! Local replica store
//!
//! SQLite holds three collections: the coded data (`codes`, `ontologies`)
//! written by the sync engine, and a generic key/value cache (`kv_cache`) that
//! the version guard wipes on upgrades. The stored version record lives in
//! the key/value cache under [`STORED_VERSION_KEY`].

use crate::error::{Result, SyncError};
use chrono::Utc;
use ontosync_common::{Code, CodeId, Ontology, StoredVersion};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Cache key of the `{b, f}` version record.
pub const STORED_VERSION_KEY: &str = "__v";

/// Handle on the local replica database
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

/// One ontology as listed by [`LocalStore::list_ontologies`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OntologySummary {
    pub name: String,
    pub root_count: usize,
    pub code_count: u64,
    pub synced_at: String,
}

impl LocalStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::migrate(&pool).await?;
        debug!(path = %path.display(), "Opened local store");

        Ok(Self {
            pool,
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self> {
        // A single connection that never expires: every new connection to
        // `sqlite::memory:` would see a different, empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;

        Self::migrate(&pool).await?;

        Ok(Self { pool, path: None })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("./migrations").run(pool).await?;
        Ok(())
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ========================================================================
    // Coded data
    // ========================================================================

    /// Number of codes belonging to `ontology_id`.
    pub async fn count_codes(&self, ontology_id: &str) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM codes WHERE ontology_id = ?1")
            .bind(ontology_id)
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.get("count");
        Ok(count.max(0) as u64)
    }

    pub async fn total_codes(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM codes")
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.get("count");
        Ok(count.max(0) as u64)
    }

    /// Insert-or-replace a batch of codes in one transaction.
    pub async fn bulk_put_codes(&self, codes: &[Code]) -> Result<()> {
        if codes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for code in codes {
            let path =
                serde_json::to_string(&code.path).map_err(|e| SyncError::parse("code path", e))?;

            sqlx::query(
                r#"
                INSERT OR REPLACE INTO codes (id, ontology_id, path, code, description)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(code.id)
            .bind(&code.ontology_id)
            .bind(path)
            .bind(&code.code)
            .bind(code.description.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Insert-or-replace an ontology aggregate.
    pub async fn put_ontology(&self, ontology: &Ontology) -> Result<()> {
        let roots = serde_json::to_string(&ontology.root_code_ids)
            .map_err(|e| SyncError::parse("ontology roots", e))?;

        sqlx::query(
            r#"
            INSERT INTO ontologies (name, root_code_ids, synced_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                root_code_ids = excluded.root_code_ids,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&ontology.name)
        .bind(roots)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_ontology(&self, name: &str) -> Result<Option<Ontology>> {
        let row = sqlx::query("SELECT name, root_code_ids FROM ontologies WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let roots: String = row.get("root_code_ids");
            Ok(Ontology {
                name: row.get("name"),
                root_code_ids: decode_ids(&roots, "ontology roots")?,
            })
        })
        .transpose()
    }

    /// All ontologies with their local code counts, by name.
    pub async fn list_ontologies(&self) -> Result<Vec<OntologySummary>> {
        let rows = sqlx::query(
            r#"
            SELECT o.name, o.root_code_ids, o.synced_at,
                   (SELECT COUNT(*) FROM codes c WHERE c.ontology_id = o.name) AS code_count
            FROM ontologies o
            ORDER BY o.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let roots: String = row.get("root_code_ids");
                let code_count: i64 = row.get("code_count");
                Ok(OntologySummary {
                    name: row.get("name"),
                    root_count: decode_ids(&roots, "ontology roots")?.len(),
                    code_count: code_count.max(0) as u64,
                    synced_at: row.get("synced_at"),
                })
            })
            .collect()
    }

    /// Codes of one ontology ordered by identifier.
    pub async fn codes_for_ontology(&self, ontology_id: &str) -> Result<Vec<Code>> {
        let rows = sqlx::query(
            r#"
            SELECT id, ontology_id, path, code, description
            FROM codes WHERE ontology_id = ?1
            ORDER BY id
            "#,
        )
        .bind(ontology_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let path: String = row.get("path");
                Ok(Code {
                    id: row.get("id"),
                    ontology_id: row.get("ontology_id"),
                    path: decode_ids(&path, "code path")?,
                    code: row.get("code"),
                    description: row.get("description"),
                })
            })
            .collect()
    }

    /// Drop every code and ontology.
    pub async fn clear_coded_data(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM codes").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM ontologies").execute(&mut *tx).await?;
        tx.commit().await?;

        info!("Cleared coded data store");
        Ok(())
    }

    // ========================================================================
    // Generic key/value cache
    // ========================================================================

    pub async fn kv_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let row = sqlx::query("SELECT value FROM kv_cache WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let value: String = row.get("value");
            serde_json::from_str(&value)
                .map_err(|e| SyncError::parse(format!("cache entry '{}'", key), e))
        })
        .transpose()
    }

    pub async fn kv_set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_string(value)
            .map_err(|e| SyncError::parse(format!("cache entry '{}'", key), e))?;

        sqlx::query(
            r#"
            INSERT INTO kv_cache (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns whether the key existed.
    pub async fn kv_remove(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_cache WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Wipe the whole key/value cache, version record included.
    pub async fn kv_clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM kv_cache").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn stored_version(&self) -> Result<Option<StoredVersion>> {
        self.kv_get(STORED_VERSION_KEY).await
    }

    pub async fn set_stored_version(&self, version: &StoredVersion) -> Result<()> {
        self.kv_set(STORED_VERSION_KEY, version).await
    }

    /// Clear both the generic cache and the coded data, so the next startup
    /// behaves like a first run.
    pub async fn reset(&self) -> Result<()> {
        self.kv_clear().await?;
        self.clear_coded_data().await
    }
}

fn decode_ids(json: &str, context: &str) -> Result<Vec<CodeId>> {
    serde_json::from_str(json).map_err(|e| SyncError::parse(context, e))
}
