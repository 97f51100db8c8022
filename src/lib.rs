//! ResearchFlow - search history persistence and cloud reconciliation
//!
//! This library keeps a bounded, per-user and per-workspace search history in
//! a local key-value store, coalesces rapid writes, and merges the user's
//! cloud history back in on sign-in.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `storage`: Local key-value backends (SQLite and in-memory)
//! - `history`: Entries, the bounded history store, and the debounced writer
//! - `sync`: Remote store clients, reconciliation, migration and run-once guards
//! - `session`: Sign-in/sign-out coordination
//! - `timeout`: Bounded waits for fire-and-forget work
//! - `analytics`: Fire-and-forget analytics events
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use researchflow::config::StorageConfig;
//! use researchflow::history::{HistoryEntry, HistoryStore};
//! use researchflow::storage::MemoryKeyValueStore;
//!
//! let store = HistoryStore::new(Arc::new(MemoryKeyValueStore::new()), StorageConfig::default());
//! store.save(&HistoryEntry::new("rust ownership"), Some("research"), Some("user-1"));
//!
//! let history = store.load(Some("research"), Some("user-1"));
//! assert_eq!(history[0].query, "rust ownership");
//! ```

pub mod analytics;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod session;
pub mod storage;
pub mod sync;
pub mod timeout;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, ResearchFlowError};
pub use history::{HistoryEntry, HistoryStore, SaveOutcome, Workspace, WriteCoalescer};
pub use session::{SessionCoordinator, SignInOutcome};
pub use timeout::{attempt_with_timeout, Attempt};

#[cfg(test)]
pub mod test_utils;
