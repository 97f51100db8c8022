//! Local key-value persistence
//!
//! History partitions, migration flags and the active-user marker all live in
//! a flat string-keyed, string-valued store with a finite quota. Two backends
//! are provided: [`SqliteKeyValueStore`] for on-disk persistence and
//! [`MemoryKeyValueStore`] for tests and ephemeral sessions.

use crate::error::{Result, ResearchFlowError};
use anyhow::Context;
use directories::ProjectDirs;
use std::path::PathBuf;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

/// Result of a key-value operation.
///
/// Kept as a typed error (rather than `anyhow`) so that callers can match on
/// [`ResearchFlowError::QuotaExceeded`] without downcasting.
pub type StoreResult<T> = std::result::Result<T, ResearchFlowError>;

/// Synchronous string key-value storage with a finite quota
///
/// Implementations must be safe to share across tasks. Every operation is
/// synchronous so that a read-modify-write never spans an `.await`.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key is absent
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value, failing with `QuotaExceeded` if the store is full
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove a key; removing an absent key is not an error
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Enumerate every key currently stored
    fn keys(&self) -> StoreResult<Vec<String>>;
}

/// Default location of the local database file
///
/// Resolves to `<data dir>/researchflow/history.db` and creates the parent
/// directory if needed.
pub fn default_db_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "researchflow", "researchflow").ok_or_else(|| {
        ResearchFlowError::Storage("Could not determine data directory".into())
    })?;

    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .context("Failed to create data directory")
        .map_err(|e| ResearchFlowError::Storage(e.to_string()))?;

    Ok(data_dir.join("history.db"))
}
