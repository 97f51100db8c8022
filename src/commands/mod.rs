/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `history`: list, delete and clear local history
- `record`: record a completed search
- `sync`: sign-in flow (migration and reconciliation) and migration alone

Handlers share an [`AppContext`] holding the configuration, the local store
and the debounced writer.
*/

use crate::config::Config;
use crate::error::{Result, ResearchFlowError};
use crate::history::{HistoryStore, Workspace, WriteCoalescer};
use crate::session::SessionCoordinator;
use crate::storage::SqliteKeyValueStore;
use crate::sync::RestRemoteStore;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

pub mod history;
pub mod record;
pub mod sync;

/// Shared state of one CLI invocation
pub struct AppContext {
    /// Effective configuration
    pub config: Config,
    /// Local history store
    pub store: Arc<HistoryStore>,
    /// Debounced writer in front of `store`
    pub coalescer: WriteCoalescer,
}

impl AppContext {
    /// Open the local database named by the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or created
    pub fn open(config: Config) -> Result<Self> {
        let kv = match &config.storage.db_path {
            Some(path) => SqliteKeyValueStore::new_with_path(path.clone())?,
            None => SqliteKeyValueStore::new()?,
        }
        .with_quota(config.storage.quota_bytes);
        tracing::debug!(db_path = %kv.db_path().display(), "Opened local history database");

        let store = Arc::new(HistoryStore::new(Arc::new(kv), config.storage.clone()));
        let coalescer = WriteCoalescer::new(store.clone(), config.coalescer.debounce());
        Ok(Self {
            config,
            store,
            coalescer,
        })
    }

    /// Whether a remote store is configured
    pub fn has_remote(&self) -> bool {
        self.config.sync.remote_url.is_some()
    }

    /// Session coordinator talking to the configured remote store
    ///
    /// # Errors
    ///
    /// Returns error if no remote store is configured
    pub fn session(&self) -> Result<SessionCoordinator> {
        let remote = Arc::new(RestRemoteStore::new(&self.config.sync)?);
        Ok(SessionCoordinator::new(
            self.coalescer.clone(),
            remote,
            &self.config.sync,
        ))
    }
}

/// Workspaces named on the command line plus those in an optional JSON file
///
/// Ids given on the command line become workspaces named after their id.
/// Duplicates are dropped, keeping the first occurrence.
pub fn load_workspaces(ids: &[String], file: Option<&Path>) -> Result<Vec<Workspace>> {
    let mut workspaces: Vec<Workspace> = Vec::new();

    if let Some(path) = file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workspaces file {}", path.display()))?;
        let parsed: Vec<Workspace> = serde_json::from_str(&contents).map_err(|e| {
            ResearchFlowError::Config(format!(
                "Invalid workspaces file {}: {}",
                path.display(),
                e
            ))
        })?;
        workspaces.extend(parsed);
    }

    workspaces.extend(ids.iter().map(|id| Workspace::new(id.clone(), id.clone())));

    let mut seen = std::collections::HashSet::new();
    workspaces.retain(|ws| seen.insert(ws.id.clone()));
    Ok(workspaces)
}
