//! Sign-in/sign-out driver tying the local store to the cloud
//!
//! On sign-in the coordinator wipes a previous identity's local partitions,
//! runs the one-time migration and then reconciles cloud history, each step
//! isolated so that a failure in one never blocks the others. New searches
//! are saved locally through the debounced writer and mirrored to the cloud
//! without making the caller wait longer than a fixed bound.

use crate::config::SyncConfig;
use crate::error::Result;
use crate::history::{HistoryEntry, HistoryStore, WriteCoalescer, Workspace};
use crate::sync::{
    CloudSync, MigrationOutcome, Migrator, ReconcileOutcome, RemoteHistoryStore, RemoteNotesStore,
    RemoteWorkspaceStore,
};
use crate::timeout::{attempt_with_timeout, Attempt};
use std::sync::Arc;
use std::time::Duration;

/// Local key remembering the last user signed in on this device
pub const ACTIVE_USER_KEY: &str = "researchflow_active_user";

/// What [`SessionCoordinator::on_sign_in`] did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInOutcome {
    /// Previous user whose local partitions were removed, with the key count
    pub cleared_previous_user: Option<(String, usize)>,
    /// Migration result when it ran successfully
    pub migration: Option<MigrationOutcome>,
    /// Migration failure, if any; sign-in continues regardless
    pub migration_error: Option<String>,
    /// Reconciliation result
    pub reconcile: ReconcileOutcome,
}

/// Drives the history subsystem across a user session
pub struct SessionCoordinator {
    store: Arc<HistoryStore>,
    coalescer: WriteCoalescer,
    sync: CloudSync,
    migrator: Migrator,
    workspaces: Arc<dyn RemoteWorkspaceStore>,
    mirror_timeout: Duration,
}

impl SessionCoordinator {
    /// Create a coordinator using `remote` for history, workspaces and notes
    pub fn new<R>(
        coalescer: WriteCoalescer,
        remote: Arc<R>,
        config: &SyncConfig,
    ) -> Self
    where
        R: RemoteHistoryStore + RemoteWorkspaceStore + RemoteNotesStore + 'static,
    {
        let store = coalescer.store().clone();
        let sync = CloudSync::new(store.clone(), remote.clone(), config.merge_cap);
        let migrator = Migrator::new(store.kv().clone(), remote.clone(), remote.clone());
        Self {
            store,
            coalescer,
            sync,
            migrator,
            workspaces: remote,
            mirror_timeout: config.mirror_timeout(),
        }
    }

    /// The local history store
    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    /// The debounced writer
    pub fn coalescer(&self) -> &WriteCoalescer {
        &self.coalescer
    }

    /// The cloud reconciler
    pub fn cloud_sync(&self) -> &CloudSync {
        &self.sync
    }

    /// The one-time migrator
    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }

    /// Last user recorded as active on this device
    pub fn active_user(&self) -> Option<String> {
        match self.store.kv().get(ACTIVE_USER_KEY) {
            Ok(user) => user.filter(|u| !u.is_empty()),
            Err(e) => {
                tracing::warn!("Failed to read active user: {}", e);
                None
            }
        }
    }

    /// Handle a successful sign-in of `user_id`
    ///
    /// Never fails; each step's problems are logged and reported in the
    /// returned outcome.
    pub async fn on_sign_in(&self, user_id: &str, workspaces: &[Workspace]) -> SignInOutcome {
        let mut outcome = SignInOutcome::default();

        if let Some(previous) = self.active_user().filter(|prev| prev != user_id) {
            // Pending writes of the previous user must not land after the wipe.
            self.coalescer.flush_all();
            match self.store.clear_all_for_user(&previous) {
                Ok(removed) => {
                    tracing::info!(previous = %previous, removed, "Cleared previous user's local history");
                    outcome.cleared_previous_user = Some((previous, removed));
                }
                Err(e) => tracing::error!(previous = %previous, "Failed to clear previous user's history: {:#}", e),
            }
        }

        if let Err(e) = self.store.kv().set(ACTIVE_USER_KEY, user_id) {
            tracing::error!(user = %user_id, "Failed to record active user: {}", e);
        }

        if !self.migrator.is_migration_complete(user_id) {
            match self.migrator.migrate_user_data(user_id, workspaces).await {
                Ok(migration) => outcome.migration = Some(migration),
                Err(e) => {
                    tracing::error!(user = %user_id, "Migration failed: {:#}", e);
                    outcome.migration_error = Some(format!("{:#}", e));
                }
            }
        }

        outcome.reconcile = self.sync.reconcile(user_id, workspaces).await;
        outcome
    }

    /// Handle sign-out of `user_id`
    ///
    /// Pending writes are flushed and the user's run-once guards reset, so
    /// the next sign-in reconciles again.
    pub fn on_sign_out(&self, user_id: &str) {
        let flushed = self.coalescer.flush_all();
        self.sync.guards().reset(user_id);
        self.migrator.guards().reset(user_id);
        tracing::info!(user = %user_id, flushed, "Signed out");
    }

    /// Record a completed search
    ///
    /// The local save is debounced. The cloud mirror is attempted with a
    /// bounded wait; `Completed(true)` means the cloud accepted the entry.
    pub async fn record_search(&self, user_id: &str, entry: HistoryEntry) -> Attempt<bool> {
        let workspace_id = entry.workspace_id.clone();
        self.coalescer
            .schedule_save(entry.clone(), Some(&workspace_id), Some(user_id));

        let remote = self.sync.remote().clone();
        let user = user_id.to_string();
        attempt_with_timeout(self.mirror_timeout, async move {
            match remote.upsert(&user, &entry).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(user = %user, id = %entry.id, "Failed to mirror history entry: {:#}", e);
                    false
                }
            }
        })
        .await
    }

    /// Delete one entry locally and, best-effort, in the cloud
    pub async fn delete_search(
        &self,
        user_id: &str,
        workspace_id: &str,
        entry_id: &str,
    ) -> Result<bool> {
        self.coalescer.flush_all();
        let removed = self
            .store
            .delete(entry_id, Some(workspace_id), Some(user_id))?;

        let remote = self.sync.remote().clone();
        let (user, id) = (user_id.to_string(), entry_id.to_string());
        let mirrored = attempt_with_timeout(self.mirror_timeout, async move {
            remote.delete(&user, &id).await
        })
        .await;
        log_mirror_failure(user_id, "delete", mirrored);
        Ok(removed)
    }

    /// Empty one workspace locally and, best-effort, in the cloud
    pub async fn clear_workspace(&self, user_id: &str, workspace_id: &str) -> Result<()> {
        self.coalescer.cancel(Some(workspace_id), Some(user_id));
        self.store.clear(Some(workspace_id), Some(user_id))?;

        let remote = self.sync.remote().clone();
        let (user, ws) = (user_id.to_string(), workspace_id.to_string());
        let mirrored = attempt_with_timeout(self.mirror_timeout, async move {
            remote.clear_workspace(&user, &ws).await
        })
        .await;
        log_mirror_failure(user_id, "clear", mirrored);
        Ok(())
    }

    /// Drop a workspace: its local partition, its cloud history and the
    /// cloud workspace row
    ///
    /// The cloud side is best-effort and bounded like every other mirror.
    pub async fn delete_workspace(&self, user_id: &str, workspace_id: &str) -> Result<()> {
        self.coalescer.cancel(Some(workspace_id), Some(user_id));
        self.store.clear(Some(workspace_id), Some(user_id))?;

        let history = self.sync.remote().clone();
        let workspaces = self.workspaces.clone();
        let (user, ws) = (user_id.to_string(), workspace_id.to_string());
        let mirrored = attempt_with_timeout(self.mirror_timeout, async move {
            history.clear_workspace(&user, &ws).await?;
            workspaces.delete(&user, &ws).await
        })
        .await;
        log_mirror_failure(user_id, "delete workspace", mirrored);
        Ok(())
    }
}

fn log_mirror_failure(user_id: &str, action: &str, attempt: Attempt<Result<()>>) {
    match attempt {
        Attempt::Completed(Ok(())) => {}
        Attempt::Completed(Err(e)) => {
            tracing::warn!(user = %user_id, action, "Cloud mirror failed: {:#}", e)
        }
        Attempt::TimedOut => tracing::warn!(user = %user_id, action, "Cloud mirror timed out"),
        Attempt::Panicked => tracing::error!(user = %user_id, action, "Cloud mirror panicked"),
    }
}
