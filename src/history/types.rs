use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Workspace id used when an entry or partition has none
pub const DEFAULT_WORKSPACE: &str = "default";

pub(crate) fn default_workspace_id() -> String {
    DEFAULT_WORKSPACE.to_string()
}

/// One search result shown for a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Page title
    pub title: String,
    /// Short description returned by the search provider
    pub description: String,
    /// Result URL
    pub url: String,
    /// Optional highlighted snippet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Generated summary of a result set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Summary text
    pub summary: String,
    /// Extracted key points
    #[serde(default)]
    pub key_points: Vec<String>,
    /// Word count reported by the summarizer, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u32>,
}

/// A record of one completed search action
///
/// Serialized with camelCase field names so partitions written by the web
/// client and by this crate are interchangeable.
///
/// # Examples
///
/// ```
/// use researchflow::history::{HistoryEntry, DEFAULT_WORKSPACE};
///
/// let entry = HistoryEntry::new("rust async runtimes");
/// assert_eq!(entry.id.len(), 26);
/// assert_eq!(entry.workspace_id, DEFAULT_WORKSPACE);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Unique identifier, assigned at creation
    pub id: String,
    /// Original search text
    pub query: String,
    /// Creation time in milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Ordered search results
    #[serde(default)]
    pub results: Vec<SearchResult>,
    /// Generated summary and key points
    #[serde(default)]
    pub summary: Summary,
    /// Follow-up questions
    #[serde(default)]
    pub questions: Vec<String>,
    /// Owning workspace
    #[serde(default = "default_workspace_id")]
    pub workspace_id: String,
}

impl HistoryEntry {
    /// Create an entry for `query` with a fresh ULID and the current time
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: new_entry_id(),
            query: query.into(),
            timestamp: Utc::now().timestamp_millis(),
            results: Vec::new(),
            summary: Summary::default(),
            questions: Vec::new(),
            workspace_id: default_workspace_id(),
        }
    }

    /// Set the summary text and key points
    pub fn with_summary(mut self, summary: impl Into<String>, key_points: Vec<String>) -> Self {
        self.summary = Summary {
            summary: summary.into(),
            key_points,
            word_count: None,
        };
        self
    }

    /// Set the result list
    pub fn with_results(mut self, results: Vec<SearchResult>) -> Self {
        self.results = results;
        self
    }

    /// Set the follow-up questions
    pub fn with_questions(mut self, questions: Vec<String>) -> Self {
        self.questions = questions;
        self
    }

    /// Set the owning workspace
    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = workspace_id.into();
        self
    }

    /// Creation time as a UTC datetime (epoch for out-of-range values)
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }
}

/// A user-defined partition for organizing searches and notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    /// Workspace id, also the partition suffix of its history key
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional icon name
    #[serde(default)]
    pub icon: Option<String>,
    /// Optional accent colour
    #[serde(default)]
    pub color: Option<String>,
    /// Pinned by the user
    #[serde(default)]
    pub is_favorite: bool,
    /// Hidden from the default view
    #[serde(default)]
    pub is_archived: bool,
    /// Creation time in milliseconds since the Unix epoch
    pub created_at: i64,
}

impl Workspace {
    /// Create a workspace with the given id and name, created now
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: None,
            color: None,
            is_favorite: false,
            is_archived: false,
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

/// Generate a new sortable id for a history entry
pub fn new_entry_id() -> String {
    Ulid::new().to_string()
}
