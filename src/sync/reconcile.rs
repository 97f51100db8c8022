//! Merging cloud history into the local store on sign-in

use crate::error::Result;
use crate::history::{HistoryEntry, HistoryStore, Workspace};
use crate::sync::guard::RunOnceGuards;
use crate::sync::remote::{RemoteHistoryStore, WORKSPACE_FETCH_LIMIT};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Cloud history of one user keyed by workspace id, newest first per workspace
pub type CloudHistory = BTreeMap<String, Vec<HistoryEntry>>;

/// What one [`CloudSync::reconcile`] call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// False when the guard refused to run (already in flight or done)
    pub ran: bool,
    /// False when the cloud fetch failed; the guard is then left idle
    pub cloud_available: bool,
    /// Workspaces whose local partition was rewritten
    pub workspaces_merged: usize,
    /// Cloud entries that were not present locally
    pub entries_added: usize,
}

/// Merge cloud entries into a local partition
///
/// Cloud entries whose id is not already local are combined with the local
/// list, the result is ordered newest first (stable, so equal timestamps keep
/// cloud-before-local order) and truncated to `cap`. Running the merge again
/// on its own output changes nothing.
///
/// # Examples
///
/// ```
/// use researchflow::history::HistoryEntry;
/// use researchflow::sync::merge_history;
///
/// let entry = |id: &str, ts: i64| {
///     let mut e = HistoryEntry::new(id);
///     e.id = id.to_string();
///     e.timestamp = ts;
///     e
/// };
/// let local = vec![entry("a", 10), entry("b", 5)];
/// let cloud = vec![entry("c", 7), entry("a", 10)];
///
/// let merged = merge_history(&local, &cloud, 100);
/// let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
/// assert_eq!(ids, vec!["a", "c", "b"]);
/// ```
pub fn merge_history(
    local: &[HistoryEntry],
    cloud: &[HistoryEntry],
    cap: usize,
) -> Vec<HistoryEntry> {
    let local_ids: HashSet<&str> = local.iter().map(|entry| entry.id.as_str()).collect();

    let mut merged: Vec<HistoryEntry> = cloud
        .iter()
        .filter(|entry| !local_ids.contains(entry.id.as_str()))
        .chain(local.iter())
        .cloned()
        .collect();
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    merged.truncate(cap);
    merged
}

/// Group a flat, newest-first list of cloud entries by workspace
pub fn group_by_workspace(entries: Vec<HistoryEntry>) -> CloudHistory {
    let mut grouped = CloudHistory::new();
    for entry in entries {
        grouped
            .entry(entry.workspace_id.clone())
            .or_default()
            .push(entry);
    }
    grouped
}

/// Pulls cloud history into the local store
pub struct CloudSync {
    store: Arc<HistoryStore>,
    remote: Arc<dyn RemoteHistoryStore>,
    guards: RunOnceGuards,
    merge_cap: usize,
}

impl CloudSync {
    /// Create a reconciler keeping at most `merge_cap` entries per partition
    pub fn new(
        store: Arc<HistoryStore>,
        remote: Arc<dyn RemoteHistoryStore>,
        merge_cap: usize,
    ) -> Self {
        Self {
            store,
            remote,
            guards: RunOnceGuards::new(),
            merge_cap,
        }
    }

    /// Run-once guards consulted by [`CloudSync::reconcile`]
    pub fn guards(&self) -> &RunOnceGuards {
        &self.guards
    }

    /// The remote history store
    pub fn remote(&self) -> &Arc<dyn RemoteHistoryStore> {
        &self.remote
    }

    /// All cloud history of `user_id`, grouped by workspace
    ///
    /// Failures are logged and yield an empty map.
    pub async fn load_cloud_history(&self, user_id: &str) -> CloudHistory {
        match self.fetch_cloud_history(user_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(user = %user_id, "Failed to load all history: {:#}", e);
                CloudHistory::new()
            }
        }
    }

    /// The most recent cloud entries of one workspace, newest first
    ///
    /// Failures are logged and yield an empty list.
    pub async fn load_workspace_history(
        &self,
        user_id: &str,
        workspace_id: &str,
    ) -> Vec<HistoryEntry> {
        match self
            .remote
            .fetch_workspace(user_id, workspace_id, WORKSPACE_FETCH_LIMIT)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(
                    user = %user_id,
                    workspace = %workspace_id,
                    "Failed to load workspace history: {:#}",
                    e
                );
                Vec::new()
            }
        }
    }

    async fn fetch_cloud_history(&self, user_id: &str) -> Result<CloudHistory> {
        let entries = self.remote.fetch_all(user_id).await?;
        Ok(group_by_workspace(entries))
    }

    /// Merge cloud history into every local workspace partition of `user_id`
    ///
    /// Runs at most once per user per session. Workspaces with no cloud
    /// entries are left untouched.
    pub async fn reconcile(&self, user_id: &str, workspaces: &[Workspace]) -> ReconcileOutcome {
        let Some(token) = self.guards.try_begin(user_id) else {
            return ReconcileOutcome::default();
        };

        let cloud = match self.fetch_cloud_history(user_id).await {
            Ok(cloud) => cloud,
            Err(e) => {
                tracing::warn!(user = %user_id, "Cloud history unavailable, keeping local history: {:#}", e);
                return ReconcileOutcome {
                    ran: true,
                    ..ReconcileOutcome::default()
                };
            }
        };

        let mut outcome = ReconcileOutcome {
            ran: true,
            cloud_available: true,
            ..ReconcileOutcome::default()
        };

        for workspace in workspaces {
            let Some(cloud_entries) = cloud.get(&workspace.id).filter(|e| !e.is_empty()) else {
                continue;
            };

            let local = self.store.load_full(Some(&workspace.id), Some(user_id));
            let merged = merge_history(&local, cloud_entries, self.merge_cap);
            let local_ids: HashSet<&str> = local.iter().map(|e| e.id.as_str()).collect();
            let added = cloud_entries
                .iter()
                .filter(|e| !local_ids.contains(e.id.as_str()))
                .count();

            match self
                .store
                .overwrite(merged, Some(&workspace.id), Some(user_id))
            {
                Ok(kept) => {
                    tracing::debug!(
                        user = %user_id,
                        workspace = %workspace.id,
                        added,
                        kept,
                        "Merged cloud history"
                    );
                    outcome.workspaces_merged += 1;
                    outcome.entries_added += added;
                }
                Err(e) => tracing::error!(
                    user = %user_id,
                    workspace = %workspace.id,
                    "Failed to write merged history: {:#}",
                    e
                ),
            }
        }

        token.complete();
        tracing::info!(
            user = %user_id,
            workspaces = outcome.workspaces_merged,
            added = outcome.entries_added,
            "Cloud history reconciled"
        );
        outcome
    }
}
