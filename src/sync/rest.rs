//! PostgREST client for the remote history, workspace and notes tables
//!
//! Speaks the REST surface exposed by Supabase projects:
//! `{base}/rest/v1/{table}` with filter query parameters such as
//! `user_id=eq.<id>`.

use crate::config::SyncConfig;
use crate::error::{Result, ResearchFlowError};
use crate::history::{HistoryEntry, Workspace};
use crate::sync::remote::{
    HistoryRow, RemoteHistoryStore, RemoteNotesStore, RemoteWorkspaceStore, WorkspaceRow,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::json;
use std::time::Duration;

const HISTORY_TABLE: &str = "search_history";
const WORKSPACES_TABLE: &str = "user_workspaces";
const NOTES_TABLE: &str = "knowledge_notes";

/// HTTP implementation of every remote store trait
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    access_token: Option<String>,
}

impl RestRemoteStore {
    /// Create a client from the sync configuration
    ///
    /// # Errors
    ///
    /// Returns error if `sync.remote_url` is not set or the HTTP client
    /// cannot be built
    ///
    /// # Examples
    ///
    /// ```
    /// use researchflow::config::SyncConfig;
    /// use researchflow::sync::RestRemoteStore;
    ///
    /// let config = SyncConfig {
    ///     remote_url: Some("http://localhost:54321".to_string()),
    ///     api_key: Some("anon-key".to_string()),
    ///     ..SyncConfig::default()
    /// };
    /// assert!(RestRemoteStore::new(&config).is_ok());
    /// assert!(RestRemoteStore::new(&SyncConfig::default()).is_err());
    /// ```
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let base_url = config
            .remote_url
            .as_deref()
            .ok_or_else(|| ResearchFlowError::Config("sync.remote_url is not set".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(concat!("researchflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ResearchFlowError::Remote(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(base_url = %base_url, "Initialized remote store client");

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.header("apikey", key);
        }
        if let Some(token) = self.access_token.as_ref().or(self.api_key.as_ref()) {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send(&self, what: &str, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!("Failed to {}: {}", what, e);
            ResearchFlowError::Remote(format!("Failed to {}: {}", what, e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        tracing::error!("Remote store returned error {} ({}): {}", status, what, error_text);
        if status == StatusCode::CONFLICT {
            return Err(ResearchFlowError::Conflict(format!("{}: {}", what, error_text)).into());
        }
        Err(ResearchFlowError::Remote(format!(
            "Remote store returned error {} ({}): {}",
            status, what, error_text
        ))
        .into())
    }

    async fn fetch_rows(&self, what: &str, builder: RequestBuilder) -> Result<Vec<HistoryEntry>> {
        let response = self.send(what, builder).await?;
        let rows: Vec<HistoryRow> = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse history rows: {}", e);
            ResearchFlowError::Remote(format!("Failed to parse history rows: {}", e))
        })?;
        Ok(rows.into_iter().map(HistoryRow::into_entry).collect())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[async_trait]
impl RemoteHistoryStore for RestRemoteStore {
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        let builder = self.request(Method::GET, HISTORY_TABLE).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(user_id)),
            ("order", "created_at.desc".to_string()),
        ]);
        let entries = self.fetch_rows("load all history", builder).await?;
        tracing::debug!(user = %user_id, count = entries.len(), "Fetched cloud history");
        Ok(entries)
    }

    async fn fetch_workspace(
        &self,
        user_id: &str,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let builder = self.request(Method::GET, HISTORY_TABLE).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(user_id)),
            ("workspace_id", eq(workspace_id)),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        self.fetch_rows("load workspace history", builder).await
    }

    async fn upsert(&self, user_id: &str, entry: &HistoryEntry) -> Result<()> {
        let row = HistoryRow::from_entry(user_id, entry);
        let builder = self
            .request(Method::POST, HISTORY_TABLE)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row]);
        self.send("save history entry", builder).await?;
        tracing::debug!(user = %user_id, id = %entry.id, "Mirrored history entry");
        Ok(())
    }

    async fn delete(&self, user_id: &str, entry_id: &str) -> Result<()> {
        let builder = self
            .request(Method::DELETE, HISTORY_TABLE)
            .query(&[("id", eq(entry_id)), ("user_id", eq(user_id))]);
        self.send("delete history entry", builder).await?;
        Ok(())
    }

    async fn clear_workspace(&self, user_id: &str, workspace_id: &str) -> Result<()> {
        let builder = self
            .request(Method::DELETE, HISTORY_TABLE)
            .query(&[("user_id", eq(user_id)), ("workspace_id", eq(workspace_id))]);
        self.send("clear workspace history", builder).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteWorkspaceStore for RestRemoteStore {
    async fn upsert_many(&self, user_id: &str, workspaces: &[Workspace]) -> Result<()> {
        if workspaces.is_empty() {
            return Ok(());
        }
        let rows: Vec<WorkspaceRow> = workspaces
            .iter()
            .map(|ws| WorkspaceRow::from_workspace(user_id, ws))
            .collect();
        let builder = self
            .request(Method::POST, WORKSPACES_TABLE)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows);
        self.send("migrate workspaces", builder).await?;
        Ok(())
    }

    async fn delete(&self, user_id: &str, workspace_id: &str) -> Result<()> {
        let builder = self
            .request(Method::DELETE, WORKSPACES_TABLE)
            .query(&[("id", eq(workspace_id)), ("user_id", eq(user_id))]);
        self.send("delete workspace", builder).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteNotesStore for RestRemoteStore {
    async fn assign_orphaned(&self, user_id: &str, workspace_ids: &[String]) -> Result<()> {
        if workspace_ids.is_empty() {
            return Ok(());
        }
        let builder = self
            .request(Method::PATCH, NOTES_TABLE)
            .query(&[
                ("user_id", "is.null".to_string()),
                ("workspace_id", format!("in.({})", workspace_ids.join(","))),
            ])
            .header("Prefer", "return=minimal")
            .json(&json!({ "user_id": user_id }));
        self.send("update notes with user_id", builder).await?;
        Ok(())
    }
}
