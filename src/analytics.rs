//! Fire-and-forget analytics events
//!
//! Events are POSTed to `{endpoint}/api/analytics/log`. Logging never blocks
//! the caller for longer than the configured bound and never reports
//! failure; problems are only visible at debug level.

use crate::config::AnalyticsConfig;
use crate::error::{Result, ResearchFlowError};
use crate::timeout::{attempt_with_timeout, Attempt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Kind of user action being logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventType {
    Search,
    Summarize,
    Question,
    NoteCreate,
    Export,
    UiInteraction,
}

/// Area of the product an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsCategory {
    SearchWorkflow,
    KnowledgeBase,
    Exports,
    UiInteractions,
}

/// One event as sent on the wire
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsEvent {
    pub workspace_id: String,
    pub event_type: AnalyticsEventType,
    pub event_category: AnalyticsCategory,
    pub metadata: Value,
}

/// Bounded, failure-swallowing analytics client
#[derive(Debug, Clone)]
pub struct AnalyticsLogger {
    client: Client,
    endpoint: Option<String>,
    timeout: Duration,
}

impl AnalyticsLogger {
    /// Create a logger from configuration
    ///
    /// A disabled configuration produces a logger whose `log` is a no-op.
    pub fn new(config: &AnalyticsConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("researchflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ResearchFlowError::Remote(format!("Failed to create HTTP client: {}", e)))?;

        let endpoint = if config.enabled {
            config
                .endpoint
                .as_deref()
                .map(|base| format!("{}/api/analytics/log", base.trim_end_matches('/')))
        } else {
            None
        };

        Ok(Self {
            client,
            endpoint,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Whether events are actually sent
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Send an event, waiting at most the configured bound
    pub async fn log(
        &self,
        workspace_id: &str,
        event_type: AnalyticsEventType,
        event_category: AnalyticsCategory,
        metadata: Option<Value>,
    ) -> Attempt<()> {
        let Some(url) = self.endpoint.clone() else {
            return Attempt::Completed(());
        };

        let event = AnalyticsEvent {
            workspace_id: workspace_id.to_string(),
            event_type,
            event_category,
            metadata: metadata.unwrap_or_else(|| json!({})),
        };
        let client = self.client.clone();

        let attempt = attempt_with_timeout(self.timeout, async move {
            match client.post(&url).json(&event).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::debug!(status = %response.status(), "Analytics endpoint rejected event");
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Analytics request failed: {}", e),
            }
        })
        .await;

        if let Attempt::TimedOut = attempt {
            tracing::debug!(?event_type, "Analytics timeout");
        }
        attempt
    }

    /// Log a completed search
    pub async fn log_search(
        &self,
        workspace_id: &str,
        query: &str,
        results_count: usize,
        duration_ms: u64,
    ) -> Attempt<()> {
        self.log(
            workspace_id,
            AnalyticsEventType::Search,
            AnalyticsCategory::SearchWorkflow,
            Some(json!({
                "query": query,
                "results_count": results_count,
                "duration_ms": duration_ms,
            })),
        )
        .await
    }
}
