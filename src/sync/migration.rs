//! One-time push of locally known workspaces to the remote store

use crate::error::{Result, ResearchFlowError};
use crate::history::Workspace;
use crate::storage::KeyValueStore;
use crate::sync::guard::RunOnceGuards;
use crate::sync::remote::{RemoteNotesStore, RemoteWorkspaceStore};
use anyhow::Context;
use std::sync::Arc;

const MIGRATION_FLAG_PREFIX: &str = "migration_complete_";

/// Result of [`Migrator::migrate_user_data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The flag was already set; nothing was sent
    AlreadyComplete,
    /// Another migration for the same user is still running; nothing was sent
    InFlight,
    /// Workspaces were pushed and orphaned notes reassigned
    Migrated {
        /// Number of workspaces pushed
        workspaces: usize,
    },
    /// The workspace upsert hit a conflict; notes were still reassigned and
    /// the migration marked complete
    CompletedWithConflict {
        /// Number of workspaces in the attempted upsert
        workspaces: usize,
    },
}

/// Local key holding the migration flag of `user_id`
pub fn migration_flag_key(user_id: &str) -> String {
    format!("{}{}", MIGRATION_FLAG_PREFIX, user_id)
}

/// Runs the per-user one-time migration
pub struct Migrator {
    kv: Arc<dyn KeyValueStore>,
    workspaces: Arc<dyn RemoteWorkspaceStore>,
    notes: Arc<dyn RemoteNotesStore>,
    guards: RunOnceGuards,
}

impl Migrator {
    /// Create a migrator recording its flag in `kv`
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        workspaces: Arc<dyn RemoteWorkspaceStore>,
        notes: Arc<dyn RemoteNotesStore>,
    ) -> Self {
        Self {
            kv,
            workspaces,
            notes,
            guards: RunOnceGuards::new(),
        }
    }

    /// Run-once guards consulted by [`Migrator::migrate_user_data`]
    pub fn guards(&self) -> &RunOnceGuards {
        &self.guards
    }

    /// Whether the migration already ran for `user_id`
    ///
    /// An unreadable flag counts as not complete.
    pub fn is_migration_complete(&self, user_id: &str) -> bool {
        match self.kv.get(&migration_flag_key(user_id)) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                tracing::warn!(user = %user_id, "Failed to read migration flag: {}", e);
                false
            }
        }
    }

    /// Push `workspaces` and adopt their orphaned notes, once per user
    ///
    /// Overlapping calls for the same user are refused with
    /// [`MigrationOutcome::InFlight`] while the first one is running.
    ///
    /// # Errors
    ///
    /// Any remote failure other than a workspace conflict is returned and
    /// leaves the flag unset so the next sign-in retries.
    pub async fn migrate_user_data(
        &self,
        user_id: &str,
        workspaces: &[Workspace],
    ) -> Result<MigrationOutcome> {
        let Some(token) = self.guards.try_begin(user_id) else {
            if self.is_migration_complete(user_id) {
                return Ok(MigrationOutcome::AlreadyComplete);
            }
            tracing::debug!(user = %user_id, "Migration already in flight");
            return Ok(MigrationOutcome::InFlight);
        };

        if self.is_migration_complete(user_id) {
            tracing::debug!(user = %user_id, "Migration already completed");
            token.complete();
            return Ok(MigrationOutcome::AlreadyComplete);
        }

        let mut conflict = false;
        if !workspaces.is_empty() {
            match self.workspaces.upsert_many(user_id, workspaces).await {
                Ok(()) => {
                    tracing::info!(
                        user = %user_id,
                        count = workspaces.len(),
                        "Migrated workspaces"
                    );
                }
                Err(e) if is_conflict(&e) => {
                    tracing::warn!(user = %user_id, "Workspace migration conflict, continuing: {:#}", e);
                    conflict = true;
                }
                Err(e) => {
                    tracing::error!(user = %user_id, "Failed to migrate workspaces: {:#}", e);
                    return Err(e.context("Workspace migration failed"));
                }
            }

            let ids: Vec<String> = workspaces.iter().map(|ws| ws.id.clone()).collect();
            self.notes
                .assign_orphaned(user_id, &ids)
                .await
                .map_err(|e| {
                    tracing::error!(user = %user_id, "Failed to update notes with user_id: {:#}", e);
                    e
                })
                .context("Notes migration failed")?;
        }

        self.kv
            .set(&migration_flag_key(user_id), "true")
            .context("Failed to record migration flag")?;
        tracing::info!(user = %user_id, "Data migration completed");
        token.complete();

        Ok(if conflict {
            MigrationOutcome::CompletedWithConflict {
                workspaces: workspaces.len(),
            }
        } else {
            MigrationOutcome::Migrated {
                workspaces: workspaces.len(),
            }
        })
    }
}

fn is_conflict(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<ResearchFlowError>()
        .is_some_and(ResearchFlowError::is_conflict)
}
