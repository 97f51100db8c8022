//! Configuration management for ResearchFlow
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, ResearchFlowError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for ResearchFlow
///
/// Every section has serde defaults, so an empty YAML document (or a missing
/// file) yields a usable configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local history storage limits and backend settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Debounced write settings
    #[serde(default)]
    pub coalescer: CoalescerConfig,
    /// Remote store and reconciliation settings
    #[serde(default)]
    pub sync: SyncConfig,
    /// Fire-and-forget analytics settings
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

/// Local history storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite key-value database (defaults to the user data dir)
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Prefix of every history partition key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Maximum number of entries kept per partition
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Maximum serialized size of one partition (bytes)
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Entries always kept when trimming an oversized partition
    #[serde(default = "default_min_keep")]
    pub min_keep: usize,

    /// Fraction of entries kept on each trimming step
    #[serde(default = "default_trim_ratio")]
    pub trim_ratio: f32,

    /// Entries kept when the backend reports a quota failure
    #[serde(default = "default_quota_fallback_entries")]
    pub quota_fallback_entries: usize,

    /// Total bytes the local key-value store may hold (None = unlimited)
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: Option<usize>,
}

fn default_key_prefix() -> String {
    "voicesearch_history".to_string()
}

fn default_max_entries() -> usize {
    50
}

fn default_max_bytes() -> usize {
    100 * 1024 // 100 KB
}

fn default_min_keep() -> usize {
    10
}

fn default_trim_ratio() -> f32 {
    0.75
}

fn default_quota_fallback_entries() -> usize {
    10
}

fn default_quota_bytes() -> Option<usize> {
    Some(5 * 1024 * 1024) // 5 MB
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            key_prefix: default_key_prefix(),
            max_entries: default_max_entries(),
            max_bytes: default_max_bytes(),
            min_keep: default_min_keep(),
            trim_ratio: default_trim_ratio(),
            quota_fallback_entries: default_quota_fallback_entries(),
            quota_bytes: default_quota_bytes(),
        }
    }
}

/// Debounced write configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoalescerConfig {
    /// Quiet period before a queued save is written (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    300
}

impl CoalescerConfig {
    /// Debounce interval as a `Duration`
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Remote store and reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the PostgREST-style remote store (e.g. a Supabase project)
    #[serde(default)]
    pub remote_url: Option<String>,

    /// API key sent as the `apikey` header
    #[serde(default)]
    pub api_key: Option<String>,

    /// Bearer token of the signed-in user (falls back to the API key)
    #[serde(default)]
    pub access_token: Option<String>,

    /// Timeout applied to every remote request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Maximum entries kept in a partition after reconciliation
    #[serde(default = "default_merge_cap")]
    pub merge_cap: usize,

    /// Bounded wait for mirroring a new entry to the remote store (milliseconds)
    #[serde(default = "default_mirror_timeout_ms")]
    pub mirror_timeout_ms: u64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_merge_cap() -> usize {
    100
}

fn default_mirror_timeout_ms() -> u64 {
    2000
}

impl SyncConfig {
    /// Mirror bound as a `Duration`
    pub fn mirror_timeout(&self) -> Duration {
        Duration::from_millis(self.mirror_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            api_key: None,
            access_token: None,
            request_timeout_seconds: default_request_timeout(),
            merge_cap: default_merge_cap(),
            mirror_timeout_ms: default_mirror_timeout_ms(),
        }
    }
}

/// Analytics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Whether analytics events are sent at all
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the analytics API (`/api/analytics/log` is appended)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bounded wait for one analytics request (milliseconds)
    #[serde(default = "default_analytics_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_analytics_timeout_ms() -> u64 {
    2000
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            timeout_ms: default_analytics_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ResearchFlowError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ResearchFlowError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(db_path) = std::env::var("RESEARCHFLOW_DB_PATH") {
            tracing::debug!(db_path = %db_path, "Env override: RESEARCHFLOW_DB_PATH");
            self.storage.db_path = Some(PathBuf::from(db_path));
        }

        if let Ok(prefix) = std::env::var("RESEARCHFLOW_KEY_PREFIX") {
            self.storage.key_prefix = prefix;
        }

        if let Ok(max_entries) = std::env::var("RESEARCHFLOW_MAX_ENTRIES") {
            if let Ok(value) = max_entries.parse() {
                self.storage.max_entries = value;
            } else {
                tracing::warn!("Invalid RESEARCHFLOW_MAX_ENTRIES: {}", max_entries);
            }
        }

        if let Ok(debounce) = std::env::var("RESEARCHFLOW_DEBOUNCE_MS") {
            if let Ok(value) = debounce.parse() {
                self.coalescer.debounce_ms = value;
            } else {
                tracing::warn!("Invalid RESEARCHFLOW_DEBOUNCE_MS: {}", debounce);
            }
        }

        if let Ok(remote_url) = std::env::var("RESEARCHFLOW_REMOTE_URL") {
            tracing::debug!(remote_url = %remote_url, "Env override: RESEARCHFLOW_REMOTE_URL");
            self.sync.remote_url = Some(remote_url);
        }

        if let Ok(api_key) = std::env::var("RESEARCHFLOW_API_KEY") {
            self.sync.api_key = Some(api_key);
        }

        if let Ok(token) = std::env::var("RESEARCHFLOW_ACCESS_TOKEN") {
            self.sync.access_token = Some(token);
        }

        if let Ok(merge_cap) = std::env::var("RESEARCHFLOW_MERGE_CAP") {
            match merge_cap.parse::<usize>() {
                Ok(v) => {
                    self.sync.merge_cap = v;
                    tracing::debug!(merge_cap = v, "Env override: RESEARCHFLOW_MERGE_CAP");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for RESEARCHFLOW_MERGE_CAP: {}", merge_cap);
                }
            }
        }

        if let Ok(endpoint) = std::env::var("RESEARCHFLOW_ANALYTICS_ENDPOINT") {
            self.analytics.endpoint = Some(endpoint);
            self.analytics.enabled = true;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(db) = &cli.db {
            self.storage.db_path = Some(PathBuf::from(db));
        }

        if let Some(remote_url) = &cli.remote_url {
            self.sync.remote_url = Some(remote_url.clone());
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all limits are within acceptable ranges and that URLs parse.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.storage.key_prefix.is_empty() {
            return Err(
                ResearchFlowError::Config("storage.key_prefix cannot be empty".to_string()).into(),
            );
        }

        if self.storage.max_entries == 0 {
            return Err(ResearchFlowError::Config(
                "storage.max_entries must be greater than 0".to_string(),
            )
            .into());
        }

        if self.storage.max_bytes == 0 {
            return Err(ResearchFlowError::Config(
                "storage.max_bytes must be greater than 0".to_string(),
            )
            .into());
        }

        if self.storage.min_keep == 0 || self.storage.min_keep > self.storage.max_entries {
            return Err(ResearchFlowError::Config(
                "storage.min_keep must be between 1 and storage.max_entries".to_string(),
            )
            .into());
        }

        if self.storage.trim_ratio <= 0.0 || self.storage.trim_ratio >= 1.0 {
            return Err(ResearchFlowError::Config(
                "storage.trim_ratio must be between 0.0 and 1.0 (exclusive)".to_string(),
            )
            .into());
        }

        if self.storage.quota_fallback_entries == 0 {
            return Err(ResearchFlowError::Config(
                "storage.quota_fallback_entries must be greater than 0".to_string(),
            )
            .into());
        }

        if self.coalescer.debounce_ms == 0 || self.coalescer.debounce_ms > 60_000 {
            return Err(ResearchFlowError::Config(
                "coalescer.debounce_ms must be between 1 and 60000".to_string(),
            )
            .into());
        }

        if self.sync.merge_cap == 0 {
            return Err(
                ResearchFlowError::Config("sync.merge_cap must be greater than 0".to_string())
                    .into(),
            );
        }

        if self.sync.request_timeout_seconds == 0 {
            return Err(ResearchFlowError::Config(
                "sync.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if let Some(remote_url) = &self.sync.remote_url {
            validate_http_url("sync.remote_url", remote_url)?;
        }

        if self.analytics.enabled {
            match &self.analytics.endpoint {
                Some(endpoint) => validate_http_url("analytics.endpoint", endpoint)?,
                None => {
                    return Err(ResearchFlowError::Config(
                        "analytics.endpoint is required when analytics is enabled".to_string(),
                    )
                    .into());
                }
            }
        }

        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ResearchFlowError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ResearchFlowError::Config(format!(
            "{} must use http or https, got {}",
            field, other
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{assert_error_contains, temp_dir, test_config_yaml};
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.key_prefix, "voicesearch_history");
        assert_eq!(config.storage.max_entries, 50);
        assert_eq!(config.storage.max_bytes, 102_400);
        assert_eq!(config.coalescer.debounce_ms, 300);
        assert_eq!(config.sync.merge_cap, 100);
        assert!(!config.analytics.enabled);
    }

    #[test]
    fn test_config_validation_success() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_max_entries() {
        let mut config = Config::default();
        config.storage.max_entries = 0;
        let result = config
            .validate()
            .map_err(|e| e.downcast::<ResearchFlowError>().expect("config error"));
        assert_error_contains(result, "storage.max_entries must be greater than 0");
    }

    #[test]
    fn test_config_validation_min_keep_above_max_entries() {
        let mut config = Config::default();
        config.storage.min_keep = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_trim_ratio() {
        let mut config = Config::default();
        config.storage.trim_ratio = 1.0;
        assert!(config.validate().is_err());

        config.storage.trim_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_debounce() {
        let mut config = Config::default();
        config.coalescer.debounce_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_remote_url() {
        let mut config = Config::default();
        config.sync.remote_url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.sync.remote_url = Some("ftp://example.com".to_string());
        assert!(config.validate().is_err());

        config.sync.remote_url = Some("https://project.supabase.co".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_analytics_requires_endpoint() {
        let mut config = Config::default();
        config.analytics.enabled = true;
        assert!(config.validate().is_err());

        config.analytics.endpoint = Some("http://localhost:3000".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
storage:
  key_prefix: rf_history
  max_entries: 25
  min_keep: 5
coalescer:
  debounce_ms: 150
sync:
  remote_url: https://example.supabase.co
  api_key: anon-key
  merge_cap: 80
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.key_prefix, "rf_history");
        assert_eq!(config.storage.max_entries, 25);
        assert_eq!(config.storage.min_keep, 5);
        // Unspecified fields keep their defaults
        assert_eq!(config.storage.max_bytes, 102_400);
        assert_eq!(config.coalescer.debounce_ms, 150);
        assert_eq!(
            config.sync.remote_url.as_deref(),
            Some("https://example.supabase.co")
        );
        assert_eq!(config.sync.merge_cap, 80);
        assert_eq!(config.sync.request_timeout_seconds, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.storage.max_entries, 50);
        assert_eq!(config.analytics.timeout_ms, 2000);
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let dir = temp_dir();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, test_config_yaml()).unwrap();

        let cli = crate::cli::Cli::default();
        let config = Config::load(path.to_str().unwrap(), &cli).unwrap();
        assert_eq!(config.storage.key_prefix, "test_history");
        assert_eq!(config.coalescer.debounce(), Duration::from_millis(50));
        assert_eq!(config.sync.merge_cap, 40);
        assert!(config.analytics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let cli = crate::cli::Cli::default();
        let config = Config::load("/nonexistent/researchflow.yaml", &cli).unwrap();
        assert_eq!(config.storage.max_entries, 50);
    }

    #[test]
    fn test_cli_overrides_db_and_remote() {
        let mut cli = crate::cli::Cli::default();
        cli.db = Some("/tmp/rf-test.db".to_string());
        cli.remote_url = Some("http://localhost:54321".to_string());

        let mut config = Config::default();
        config.apply_cli_overrides(&cli);
        assert_eq!(
            config.storage.db_path,
            Some(PathBuf::from("/tmp/rf-test.db"))
        );
        assert_eq!(
            config.sync.remote_url.as_deref(),
            Some("http://localhost:54321")
        );
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_overrides_fields() {
        std::env::set_var("RESEARCHFLOW_MAX_ENTRIES", "20");
        std::env::set_var("RESEARCHFLOW_DEBOUNCE_MS", "not-a-number");
        std::env::set_var("RESEARCHFLOW_REMOTE_URL", "http://localhost:54321");
        std::env::set_var("RESEARCHFLOW_MERGE_CAP", "60");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("RESEARCHFLOW_MAX_ENTRIES");
        std::env::remove_var("RESEARCHFLOW_DEBOUNCE_MS");
        std::env::remove_var("RESEARCHFLOW_REMOTE_URL");
        std::env::remove_var("RESEARCHFLOW_MERGE_CAP");

        assert_eq!(config.storage.max_entries, 20);
        // Invalid values are ignored
        assert_eq!(config.coalescer.debounce_ms, 300);
        assert_eq!(
            config.sync.remote_url.as_deref(),
            Some("http://localhost:54321")
        );
        assert_eq!(config.sync.merge_cap, 60);
    }
}
