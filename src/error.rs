//! Error types for ResearchFlow
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for ResearchFlow operations
///
/// Covers configuration loading, the local key-value store, the remote
/// history/workspace store, and entry validation. Most history operations
/// deliberately swallow these after logging; the variants exist so that
/// callers that do care (the CLI, the one-time migration) can match on them.
#[derive(Error, Debug)]
pub enum ResearchFlowError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local key-value storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// The local store refused a write because it would exceed its quota
    #[error("Storage quota exceeded: requested={requested} bytes, quota={quota} bytes")]
    QuotaExceeded {
        /// Total bytes the store would hold after the write
        requested: usize,
        /// Configured quota in bytes
        quota: usize,
    },

    /// Remote store request failed (network, non-success status, bad payload)
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Remote store rejected an upsert because of a conflicting row
    #[error("Remote conflict: {0}")]
    Conflict(String),

    /// A history entry did not have the expected shape
    #[error("Invalid history entry: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite errors from the local key-value backend
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl ResearchFlowError {
    /// Returns true when this error is a storage quota failure
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Returns true when this error is a remote conflict (HTTP 409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Result type alias for ResearchFlow operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
