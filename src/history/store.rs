//! Per-user, per-workspace bounded history partitions
//!
//! Each (user, workspace) pair owns one key in the local key-value store
//! holding a JSON array of entries, newest first. Reads validate and repair;
//! writes dedupe by id and enforce the entry-count and byte-size caps.

use crate::config::StorageConfig;
use crate::error::{Result, ResearchFlowError};
use crate::history::groups::{group_by_day, HistoryGroups};
use crate::history::types::{HistoryEntry, DEFAULT_WORKSPACE};
use crate::history::validation::{is_valid_history_entry, repair_entry};
use crate::storage::KeyValueStore;
use chrono::{DateTime, Local};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of user-id characters used in partition keys
const USER_PREFIX_LEN: usize = 8;

/// Outcome of [`HistoryStore::save`]
///
/// `save` never fails; this tells the caller what actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written with `kept` entries in the partition
    Saved {
        /// Entries in the partition after the write
        kept: usize,
    },
    /// Written after trimming older entries to fit the byte cap
    Trimmed {
        /// Entries in the partition after the write
        kept: usize,
    },
    /// The backend hit its quota; only the most recent entries were kept
    QuotaFallback {
        /// Entries in the partition after the write
        kept: usize,
    },
    /// The entry failed validation and nothing was written
    Rejected,
    /// The backend failed and nothing was written
    Failed,
}

enum Persisted {
    Written { kept: usize, trimmed: bool },
    QuotaFallback { kept: usize },
}

/// Truncate a user id to the prefix used in partition keys
pub fn short_user_id(user_id: &str) -> String {
    user_id.chars().take(USER_PREFIX_LEN).collect()
}

/// Derive the storage key for one (user, workspace) partition
///
/// # Examples
///
/// ```
/// use researchflow::history::store::partition_key;
///
/// assert_eq!(
///     partition_key("voicesearch_history", Some("ws-1"), Some("0123456789abcdef")),
///     "voicesearch_history_01234567_ws-1"
/// );
/// assert_eq!(partition_key("voicesearch_history", None, None), "voicesearch_history_default");
/// ```
pub fn partition_key(prefix: &str, workspace_id: Option<&str>, user_id: Option<&str>) -> String {
    let workspace = workspace_or_default(workspace_id);
    match user_id {
        Some(user) => format!("{}_{}_{}", prefix, short_user_id(user), workspace),
        None => format!("{}_{}", prefix, workspace),
    }
}

fn workspace_or_default(workspace_id: Option<&str>) -> &str {
    workspace_id
        .filter(|ws| !ws.is_empty())
        .unwrap_or(DEFAULT_WORKSPACE)
}

/// Local history store
///
/// Every read-modify-write runs under an internal mutex, so the debounced
/// writer and reconciliation never interleave on the same partition.
pub struct HistoryStore {
    kv: Arc<dyn KeyValueStore>,
    config: StorageConfig,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    /// Create a store over `kv` with the given limits
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use researchflow::config::StorageConfig;
    /// use researchflow::history::{HistoryEntry, HistoryStore};
    /// use researchflow::storage::MemoryKeyValueStore;
    ///
    /// let store = HistoryStore::new(Arc::new(MemoryKeyValueStore::new()), StorageConfig::default());
    /// store.save(&HistoryEntry::new("rust"), None, Some("user-1"));
    /// assert_eq!(store.load(None, Some("user-1")).len(), 1);
    /// ```
    pub fn new(kv: Arc<dyn KeyValueStore>, config: StorageConfig) -> Self {
        Self {
            kv,
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// The underlying key-value store
    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// Storage limits in effect
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Storage key of one partition
    pub fn partition_key(&self, workspace_id: Option<&str>, user_id: Option<&str>) -> String {
        partition_key(&self.config.key_prefix, workspace_id, user_id)
    }

    /// Upsert an entry at the front of its partition
    ///
    /// Malformed entries are logged and ignored. An existing entry with the
    /// same id is replaced and moved to the front. The partition is capped at
    /// `max_entries`, then trimmed to fit `max_bytes`; on a quota failure
    /// only the `quota_fallback_entries` most recent entries are kept.
    pub fn save(
        &self,
        entry: &HistoryEntry,
        workspace_id: Option<&str>,
        user_id: Option<&str>,
    ) -> SaveOutcome {
        let valid = serde_json::to_value(entry)
            .map(|value| is_valid_history_entry(&value))
            .unwrap_or(false);
        if !valid {
            tracing::error!(id = %entry.id, query = %entry.query, "Invalid history entry, not saving");
            return SaveOutcome::Rejected;
        }

        let workspace = workspace_or_default(workspace_id);
        let key = self.partition_key(workspace_id, user_id);
        let _guard = self.lock();

        let mut history = self.load_locked(&key);
        history.retain(|existing| existing.id != entry.id);

        let mut stamped = entry.clone();
        stamped.workspace_id = workspace.to_string();
        history.insert(0, stamped);
        history.truncate(self.config.max_entries);

        match self.persist_locked(&key, history) {
            Ok(Persisted::Written {
                kept,
                trimmed: false,
            }) => SaveOutcome::Saved { kept },
            Ok(Persisted::Written {
                kept,
                trimmed: true,
            }) => SaveOutcome::Trimmed { kept },
            Ok(Persisted::QuotaFallback { kept }) => SaveOutcome::QuotaFallback { kept },
            Err(e) => {
                tracing::error!(key = %key, "Failed to save search to history: {}", e);
                SaveOutcome::Failed
            }
        }
    }

    /// Load a partition, newest first, capped at `max_entries`
    ///
    /// Absent partitions and backend failures yield an empty list. A stored
    /// value that is not a JSON array is cleared. Invalid entries are
    /// repaired when possible (and the repaired list written back) or
    /// dropped.
    pub fn load(&self, workspace_id: Option<&str>, user_id: Option<&str>) -> Vec<HistoryEntry> {
        let key = self.partition_key(workspace_id, user_id);
        let _guard = self.lock();
        let mut history = self.load_locked(&key);
        history.truncate(self.config.max_entries);
        history
    }

    /// Load a partition without the `max_entries` view cap
    ///
    /// Used by reconciliation, whose merge cap may exceed `max_entries`.
    pub fn load_full(
        &self,
        workspace_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Vec<HistoryEntry> {
        let key = self.partition_key(workspace_id, user_id);
        let _guard = self.lock();
        self.load_locked(&key)
    }

    /// Remove one entry by id
    ///
    /// Returns whether an entry was removed.
    pub fn delete(
        &self,
        id: &str,
        workspace_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<bool> {
        let key = self.partition_key(workspace_id, user_id);
        let _guard = self.lock();

        let mut history = self.load_locked(&key);
        let before = history.len();
        history.retain(|entry| entry.id != id);
        if history.len() == before {
            return Ok(false);
        }

        let serialized = serde_json::to_string(&history)?;
        self.kv.set(&key, &serialized)?;
        tracing::debug!(key = %key, id, "Deleted history entry");
        Ok(true)
    }

    /// Empty one partition
    pub fn clear(&self, workspace_id: Option<&str>, user_id: Option<&str>) -> Result<()> {
        let key = self.partition_key(workspace_id, user_id);
        let _guard = self.lock();
        self.kv.remove(&key)?;
        tracing::debug!(key = %key, "Cleared history partition");
        Ok(())
    }

    /// Delete every partition namespaced under `user_id`
    ///
    /// Used when a different identity signs in on the same device. Keys that
    /// fail to delete are logged and skipped. Returns the number removed.
    pub fn clear_all_for_user(&self, user_id: &str) -> Result<usize> {
        let prefix = format!("{}_{}_", self.config.key_prefix, short_user_id(user_id));
        let _guard = self.lock();

        let mut removed = 0;
        for key in self.kv.keys()? {
            if !key.starts_with(&prefix) {
                continue;
            }
            match self.kv.remove(&key) {
                Ok(()) => removed += 1,
                Err(e) => tracing::error!(key = %key, "Failed to remove history key: {}", e),
            }
        }

        tracing::info!(removed, "Cleared local history for user");
        Ok(removed)
    }

    /// Replace a partition wholesale
    ///
    /// Used by reconciliation, whose retention cap may exceed `max_entries`.
    /// The byte cap and quota fallback still apply. Returns the number of
    /// entries written.
    pub fn overwrite(
        &self,
        entries: Vec<HistoryEntry>,
        workspace_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<usize> {
        let workspace = workspace_or_default(workspace_id);
        let key = self.partition_key(workspace_id, user_id);
        let entries = entries
            .into_iter()
            .map(|mut entry| {
                entry.workspace_id = workspace.to_string();
                entry
            })
            .collect();

        let _guard = self.lock();
        match self.persist_locked(&key, entries)? {
            Persisted::Written { kept, .. } | Persisted::QuotaFallback { kept } => Ok(kept),
        }
    }

    /// Partition bucketed into Today / Yesterday / This Week / Older
    pub fn grouped(
        &self,
        workspace_id: Option<&str>,
        user_id: Option<&str>,
        now: DateTime<Local>,
    ) -> HistoryGroups {
        group_by_day(self.load(workspace_id, user_id), now)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn load_locked(&self, key: &str) -> Vec<HistoryEntry> {
        let raw = match self.kv.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::error!(key = %key, "Failed to retrieve search history: {}", e);
                return Vec::new();
            }
        };

        let items = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) | Err(_) => {
                tracing::error!(key = %key, "History data is not an array, clearing");
                if let Err(e) = self.kv.remove(key) {
                    tracing::error!(key = %key, "Failed to clear corrupt history: {}", e);
                }
                return Vec::new();
            }
        };

        let mut entries = Vec::with_capacity(items.len());
        let mut repaired = false;
        for item in items {
            if is_valid_history_entry(&item) {
                if let Ok(entry) = serde_json::from_value::<HistoryEntry>(item.clone()) {
                    entries.push(entry);
                    continue;
                }
            }
            match repair_entry(&item) {
                Some(entry) => {
                    entries.push(entry);
                    repaired = true;
                }
                None => tracing::debug!(key = %key, "Dropping unrepairable history entry"),
            }
        }

        if repaired && !entries.is_empty() {
            let written = serde_json::to_string(&entries)
                .map_err(ResearchFlowError::from)
                .and_then(|serialized| self.kv.set(key, &serialized));
            match written {
                Ok(()) => tracing::info!(key = %key, "Saved repaired history"),
                Err(e) => tracing::error!(key = %key, "Failed to save repaired history: {}", e),
            }
        }

        entries
    }

    fn persist_locked(&self, key: &str, mut entries: Vec<HistoryEntry>) -> Result<Persisted> {
        let mut serialized = serde_json::to_string(&entries)?;
        let mut trimmed = false;

        while serialized.len() > self.config.max_bytes && entries.len() > self.config.min_keep {
            let target = ((entries.len() as f32) * self.config.trim_ratio).floor() as usize;
            let target = target.max(self.config.min_keep);
            if target >= entries.len() {
                break;
            }
            entries.truncate(target);
            serialized = serde_json::to_string(&entries)?;
            trimmed = true;
        }

        if trimmed {
            tracing::warn!(key = %key, kept = entries.len(), "Storage limit exceeded, trimmed entries");
        }

        match self.kv.set(key, &serialized) {
            Ok(()) => Ok(Persisted::Written {
                kept: entries.len(),
                trimmed,
            }),
            Err(e) if e.is_quota_exceeded() => {
                tracing::warn!(key = %key, "{}; keeping only the most recent entries", e);
                entries.truncate(self.config.quota_fallback_entries);
                let fallback = serde_json::to_string(&entries)?;
                self.kv.set(key, &fallback).map_err(|fallback_err| {
                    tracing::error!(key = %key, "Emergency fallback failed: {}", fallback_err);
                    fallback_err
                })?;
                Ok(Persisted::QuotaFallback {
                    kept: entries.len(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
