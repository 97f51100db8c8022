//! Remote store abstractions and their row formats
//!
//! The remote side is a relational store reached over a PostgREST-style API.
//! These traits keep reconciliation and migration independent of the
//! transport so that tests can run against [`crate::sync::InMemoryRemote`].

use crate::error::Result;
use crate::history::{HistoryEntry, SearchResult, Summary, Workspace, DEFAULT_WORKSPACE};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Rows fetched per workspace by [`RemoteHistoryStore::fetch_workspace`]
pub const WORKSPACE_FETCH_LIMIT: usize = 50;

/// Cloud copy of a user's search history
#[async_trait]
pub trait RemoteHistoryStore: Send + Sync {
    /// Every entry of `user_id` across all workspaces, newest first
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<HistoryEntry>>;

    /// Up to `limit` entries of one workspace, newest first
    async fn fetch_workspace(
        &self,
        user_id: &str,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>>;

    /// Insert or update an entry by id
    async fn upsert(&self, user_id: &str, entry: &HistoryEntry) -> Result<()>;

    /// Delete one entry owned by `user_id`
    async fn delete(&self, user_id: &str, entry_id: &str) -> Result<()>;

    /// Delete every entry of one workspace owned by `user_id`
    async fn clear_workspace(&self, user_id: &str, workspace_id: &str) -> Result<()>;
}

/// Cloud copy of a user's workspaces
#[async_trait]
pub trait RemoteWorkspaceStore: Send + Sync {
    /// Insert or update workspaces by id
    async fn upsert_many(&self, user_id: &str, workspaces: &[Workspace]) -> Result<()>;

    /// Delete one workspace owned by `user_id`
    async fn delete(&self, user_id: &str, workspace_id: &str) -> Result<()>;
}

/// Knowledge notes, only as far as ownership transfer is concerned
#[async_trait]
pub trait RemoteNotesStore: Send + Sync {
    /// Give every ownerless note in `workspace_ids` to `user_id`
    async fn assign_orphaned(&self, user_id: &str, workspace_ids: &[String]) -> Result<()>;
}

/// `search_history` row as stored remotely
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
    pub query: String,
    #[serde(default)]
    pub results: Option<Vec<SearchResult>>,
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub questions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl HistoryRow {
    /// Row for `entry` owned by `user_id`
    pub fn from_entry(user_id: &str, entry: &HistoryEntry) -> Self {
        let workspace_id = if entry.workspace_id.is_empty() {
            DEFAULT_WORKSPACE.to_string()
        } else {
            entry.workspace_id.clone()
        };
        Self {
            id: entry.id.clone(),
            user_id: user_id.to_string(),
            workspace_id: Some(workspace_id),
            query: entry.query.clone(),
            results: Some(entry.results.clone()),
            summary: Some(entry.summary.clone()),
            questions: Some(entry.questions.clone()),
            created_at: Some(millis_to_rfc3339(entry.timestamp)),
        }
    }

    /// Local entry for this row
    ///
    /// Missing collections become empty and an absent or unparseable
    /// `created_at` becomes timestamp 0.
    pub fn into_entry(self) -> HistoryEntry {
        HistoryEntry {
            id: self.id,
            query: self.query,
            timestamp: self
                .created_at
                .as_deref()
                .and_then(rfc3339_to_millis)
                .unwrap_or(0),
            results: self.results.unwrap_or_default(),
            summary: self.summary.unwrap_or_default(),
            questions: self.questions.unwrap_or_default(),
            workspace_id: self
                .workspace_id
                .filter(|ws| !ws.is_empty())
                .unwrap_or_else(|| DEFAULT_WORKSPACE.to_string()),
        }
    }
}

/// `user_workspaces` row as stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: String,
}

impl WorkspaceRow {
    /// Row for `workspace` owned by `user_id`
    pub fn from_workspace(user_id: &str, workspace: &Workspace) -> Self {
        Self {
            id: workspace.id.clone(),
            user_id: user_id.to_string(),
            name: workspace.name.clone(),
            icon: workspace.icon.clone(),
            color: workspace.color.clone(),
            is_favorite: workspace.is_favorite,
            is_archived: workspace.is_archived,
            created_at: millis_to_rfc3339(workspace.created_at),
        }
    }
}

/// Format epoch milliseconds as RFC 3339 (UTC, millisecond precision)
pub fn millis_to_rfc3339(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp into epoch milliseconds
pub fn rfc3339_to_millis(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}
