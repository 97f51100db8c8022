use crate::commands::{load_workspaces, AppContext};
use crate::error::Result;
use crate::sync::MigrationOutcome;
use colored::Colorize;
use std::path::Path;

/// Run the sign-in flow for `user`
///
/// Clears another user's local data if one was active, runs the one-time
/// migration and merges cloud history into every given workspace.
pub async fn run_sync(
    ctx: &AppContext,
    user: &str,
    workspace_ids: &[String],
    workspaces_file: Option<&Path>,
) -> Result<()> {
    let workspaces = load_workspaces(workspace_ids, workspaces_file)?;
    let session = ctx.session()?;

    tracing::info!(user = %user, workspaces = workspaces.len(), "Starting cloud sync");
    let outcome = session.on_sign_in(user, &workspaces).await;

    if let Some((previous, removed)) = &outcome.cleared_previous_user {
        println!(
            "{}",
            format!("Cleared {} partition(s) of previous user {}", removed, previous).yellow()
        );
    }
    if let Some(error) = &outcome.migration_error {
        println!("{}", format!("Migration failed: {}", error).red());
    }
    if !outcome.reconcile.cloud_available {
        println!("{}", "Cloud history unavailable; local history kept.".yellow());
    } else {
        println!(
            "{}",
            format!(
                "Merged {} new entr(ies) into {} workspace(s)",
                outcome.reconcile.entries_added, outcome.reconcile.workspaces_merged
            )
            .green()
        );
    }

    Ok(())
}

/// Run only the one-time migration for `user`
pub async fn run_migrate(
    ctx: &AppContext,
    user: &str,
    workspace_ids: &[String],
    workspaces_file: Option<&Path>,
) -> Result<()> {
    let workspaces = load_workspaces(workspace_ids, workspaces_file)?;
    let session = ctx.session()?;

    match session.migrator().migrate_user_data(user, &workspaces).await? {
        MigrationOutcome::AlreadyComplete => {
            println!("{}", "Migration already completed.".yellow())
        }
        MigrationOutcome::InFlight => {
            println!("{}", "Migration already running for this user.".yellow())
        }
        MigrationOutcome::Migrated { workspaces } => println!(
            "{}",
            format!("Migrated {} workspace(s) to the cloud.", workspaces).green()
        ),
        MigrationOutcome::CompletedWithConflict { workspaces } => println!(
            "{}",
            format!(
                "Migration completed; {} workspace(s) conflicted with existing rows.",
                workspaces
            )
            .yellow()
        ),
    }
    Ok(())
}
