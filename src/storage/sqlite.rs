use crate::error::{Result, ResearchFlowError};
use crate::storage::{default_db_path, KeyValueStore, StoreResult};
use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// SQLite-backed key-value store
///
/// Holds every key in a single `kv` table. A connection is opened per
/// operation, which keeps the type `Send + Sync` without a connection pool.
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db_path: PathBuf,
    quota_bytes: Option<usize>,
}

impl SqliteKeyValueStore {
    /// Create a store in the user's data directory
    pub fn new() -> Result<Self> {
        Self::new_with_path(default_db_path()?)
    }

    /// Create a store that uses the specified database path.
    ///
    /// # Examples
    ///
    /// ```
    /// use researchflow::storage::SqliteKeyValueStore;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SqliteKeyValueStore::new_with_path(dir.path().join("kv.db")).unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure parent directory exists so opening the DB file succeeds.
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| ResearchFlowError::Storage(e.to_string()))?;
        }

        let store = Self {
            db_path,
            quota_bytes: None,
        };
        store.init()?;
        Ok(store)
    }

    /// Limit the total bytes (keys plus values) the store may hold
    pub fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Path of the underlying database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create kv table")?;
        Ok(())
    }

    fn open(&self) -> StoreResult<Connection> {
        Connection::open(&self.db_path)
            .map_err(|e| ResearchFlowError::Storage(format!("Failed to open database: {}", e)))
    }

    fn bytes_excluding(&self, conn: &Connection, key: &str) -> StoreResult<usize> {
        let used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
             FROM kv WHERE key != ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(used).unwrap_or(0))
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.open()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.open()?;

        if let Some(quota) = self.quota_bytes {
            let requested = self.bytes_excluding(&conn, key)? + key.len() + value.len();
            if requested > quota {
                tracing::warn!(key, requested, quota, "Local store quota exceeded");
                return Err(ResearchFlowError::QuotaExceeded { requested, quota });
            }
        }

        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}
