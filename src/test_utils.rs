//! Test utilities for ResearchFlow
//!
//! Temporary directories, instrumented key-value stores, entry builders and
//! assertion helpers shared by the unit tests.

use crate::config::Config;
use crate::error::ResearchFlowError;
use crate::history::HistoryEntry;
use crate::storage::{KeyValueStore, MemoryKeyValueStore, StoreResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Build an entry with a fixed id and timestamp
pub fn entry_with(id: &str, timestamp: i64) -> HistoryEntry {
    let mut entry = HistoryEntry::new(format!("query {}", id));
    entry.id = id.to_string();
    entry.timestamp = timestamp;
    entry
}

/// In-memory store that counts writes and can be told to fail
///
/// Used to observe how many times the history layer actually hits storage.
#[derive(Debug, Default)]
pub struct CountingKeyValueStore {
    inner: MemoryKeyValueStore,
    sets: AtomicUsize,
    fail_writes: AtomicBool,
}

impl CountingKeyValueStore {
    /// Create an empty, unlimited store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set` calls so far
    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Make every subsequent `set` fail with a storage error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for CountingKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ResearchFlowError::Storage("injected write failure".into()));
        }
        self.inner.set(key, value)?;
        self.sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.inner.keys()
    }
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: Result<T, ResearchFlowError>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Create a test configuration with default values
pub fn test_config() -> Config {
    Config::default()
}

/// Create a test configuration YAML string
pub fn test_config_yaml() -> String {
    r#"
storage:
  key_prefix: test_history
  max_entries: 20
  max_bytes: 32768
  min_keep: 5
coalescer:
  debounce_ms: 50
sync:
  remote_url: http://localhost:54321
  api_key: test-anon-key
  merge_cap: 40
analytics:
  enabled: true
  endpoint: http://localhost:3000
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_counting_store_counts_and_fails() {
        let store = CountingKeyValueStore::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.set_count(), 1);

        store.fail_writes(true);
        assert!(store.set("b", "2").is_err());
        assert_eq!(store.set_count(), 1);
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: Result<(), ResearchFlowError> =
            Err(ResearchFlowError::Config("test error message".to_string()));
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        let result: Result<(), ResearchFlowError> = Ok(());
        assert_error_contains(result, "error");
    }

    #[test]
    fn test_test_config() {
        let config = test_config();
        assert_eq!(config.storage.max_entries, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_test_config_yaml() {
        let yaml = test_config_yaml();
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.storage.key_prefix, "test_history");
        assert_eq!(config.coalescer.debounce_ms, 50);
        assert!(config.validate().is_ok());
    }
}
