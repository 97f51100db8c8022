use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use researchflow::config::StorageConfig;
use researchflow::history::{HistoryEntry, HistoryStore};
use researchflow::storage::SqliteKeyValueStore;

#[allow(dead_code)]
pub fn create_test_store() -> (Arc<HistoryStore>, TempDir) {
    create_test_store_with(StorageConfig::default())
}

#[allow(dead_code)]
pub fn create_test_store_with(config: StorageConfig) -> (Arc<HistoryStore>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("history.db");
    let kv = SqliteKeyValueStore::new_with_path(db_path)
        .expect("failed to create sqlite store with path")
        .with_quota(config.quota_bytes);
    (Arc::new(HistoryStore::new(Arc::new(kv), config)), tmp)
}

#[allow(dead_code)]
pub fn entry(id: &str, timestamp: i64) -> HistoryEntry {
    let mut entry = HistoryEntry::new(format!("query {}", id));
    entry.id = id.to_string();
    entry.timestamp = timestamp;
    entry
}

#[allow(dead_code)]
pub fn ids(entries: &[HistoryEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.id.as_str()).collect()
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
