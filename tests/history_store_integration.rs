//! Local history store integration tests against the SQLite backend

mod common;

use common::{create_test_store, create_test_store_with, entry, ids};
use researchflow::config::StorageConfig;
use researchflow::history::SaveOutcome;
use serde_json::json;

// ---------------------------------------------------------------------------
// Ordering and dedupe
// ---------------------------------------------------------------------------

#[test]
fn test_inserts_are_newest_first_without_duplicates() {
    let (store, _tmp) = create_test_store();
    for (id, ts) in [("a", 1), ("b", 2), ("c", 3), ("b", 4)] {
        store.save(&entry(id, ts), Some("ws"), Some("user-1"));
    }

    let loaded = store.load(Some("ws"), Some("user-1"));
    assert_eq!(ids(&loaded), vec!["b", "c", "a"]);
}

#[test]
fn test_history_survives_reopening_the_database() {
    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp.path().join("history.db");
    {
        let kv = researchflow::storage::SqliteKeyValueStore::new_with_path(&db_path).unwrap();
        let store = researchflow::HistoryStore::new(std::sync::Arc::new(kv), StorageConfig::default());
        store.save(&entry("persisted", 1), None, Some("user-1"));
    }

    let kv = researchflow::storage::SqliteKeyValueStore::new_with_path(&db_path).unwrap();
    let store = researchflow::HistoryStore::new(std::sync::Arc::new(kv), StorageConfig::default());
    assert_eq!(ids(&store.load(None, Some("user-1"))), vec!["persisted"]);
}

// ---------------------------------------------------------------------------
// Caps
// ---------------------------------------------------------------------------

#[test]
fn test_count_cap_keeps_fifty_most_recent() {
    let (store, _tmp) = create_test_store();
    for i in 0..60 {
        store.save(&entry(&format!("e{}", i), i), None, None);
    }

    let loaded = store.load(None, None);
    assert_eq!(loaded.len(), 50);
    assert_eq!(loaded.first().unwrap().id, "e59");
    assert_eq!(loaded.last().unwrap().id, "e10");
}

#[test]
fn test_sqlite_quota_triggers_fallback() {
    let config = StorageConfig {
        quota_bytes: Some(8_000),
        ..StorageConfig::default()
    };
    let (store, _tmp) = create_test_store_with(config);
    let padding = "z".repeat(400);

    let outcomes: Vec<SaveOutcome> = (0..30)
        .map(|i| {
            let e = entry(&format!("e{}", i), i).with_summary(padding.clone(), vec![]);
            store.save(&e, None, None)
        })
        .collect();

    assert!(outcomes
        .iter()
        .any(|o| matches!(o, SaveOutcome::QuotaFallback { .. })));
    let loaded = store.load(None, None);
    assert_eq!(loaded[0].id, "e29");
    assert!(loaded.len() < 30);
}

// ---------------------------------------------------------------------------
// Corruption handling
// ---------------------------------------------------------------------------

#[test]
fn test_corrupt_object_is_cleared() {
    let (store, _tmp) = create_test_store();
    let key = store.partition_key(Some("ws"), Some("user-1"));
    store.kv().set(&key, r#"{"not": "a list"}"#).unwrap();

    assert!(store.load(Some("ws"), Some("user-1")).is_empty());
    assert_eq!(store.kv().get(&key).unwrap(), None);
}

#[test]
fn test_partially_invalid_partition_is_repaired() {
    let (store, _tmp) = create_test_store();
    let key = store.partition_key(None, None);
    let raw = json!([
        {"id": "ok", "query": "fine", "timestamp": 5, "results": [],
         "summary": {"summary": "", "keyPoints": []}, "questions": []},
        {"id": "legacy", "query": "old client", "summary": "plain"},
        {"query": "no id"}
    ]);
    store.kv().set(&key, &raw.to_string()).unwrap();

    let loaded = store.load(None, None);
    assert_eq!(ids(&loaded), vec!["ok", "legacy"]);
    assert_eq!(loaded[1].summary.summary, "plain");
    assert_eq!(loaded[1].timestamp, 0);
}

// ---------------------------------------------------------------------------
// Bulk removal
// ---------------------------------------------------------------------------

#[test]
fn test_clear_all_for_user_isolation() {
    let (store, _tmp) = create_test_store();
    store.save(&entry("a", 1), Some("ws1"), Some("alice-123456"));
    store.save(&entry("b", 2), Some("ws2"), Some("alice-123456"));
    store.save(&entry("c", 3), Some("ws1"), Some("bob-7654321"));

    assert_eq!(store.clear_all_for_user("alice-123456").unwrap(), 2);
    assert!(store.load(Some("ws1"), Some("alice-123456")).is_empty());
    assert!(store.load(Some("ws2"), Some("alice-123456")).is_empty());
    assert_eq!(ids(&store.load(Some("ws1"), Some("bob-7654321"))), vec!["c"]);
}
