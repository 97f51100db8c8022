use crate::cli::HistoryCommand;
use crate::commands::AppContext;
use crate::error::{ResearchFlowError, Result};
use crate::history::{format_relative, HistoryEntry, DEFAULT_WORKSPACE};
use chrono::Local;
use colored::Colorize;
use prettytable::{format, Table};

const QUERY_WIDTH: usize = 40;

/// Handle history commands
pub async fn handle_history(ctx: &AppContext, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List {
            user,
            workspace,
            json,
            grouped,
            cloud,
        } => {
            let (user, workspace) = (user.as_deref(), workspace.as_deref());
            if cloud {
                let user = user.ok_or_else(|| {
                    ResearchFlowError::Validation("--cloud requires --user".to_string())
                })?;
                let ws = workspace.unwrap_or(DEFAULT_WORKSPACE);
                let entries = ctx
                    .session()?
                    .cloud_sync()
                    .load_workspace_history(user, ws)
                    .await;
                if json {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                } else if entries.is_empty() {
                    println!("{}", "No cloud search history found.".yellow());
                } else {
                    println!("\nCloud Search History:");
                    entries_table(&entries).printstd();
                    println!();
                }
                return Ok(());
            }
            if grouped {
                let groups = ctx.store.grouped(workspace, user, Local::now());
                if json {
                    println!("{}", serde_json::to_string_pretty(&groups)?);
                    return Ok(());
                }
                if groups.is_empty() {
                    println!("{}", "No search history found.".yellow());
                    return Ok(());
                }
                for (label, entries) in groups.labelled() {
                    if entries.is_empty() {
                        continue;
                    }
                    println!("\n{}", label.bold());
                    entries_table(entries).printstd();
                }
                println!();
                return Ok(());
            }

            let entries = ctx.store.load(workspace, user);
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            if entries.is_empty() {
                println!("{}", "No search history found.".yellow());
                return Ok(());
            }

            println!("\nSearch History:");
            entries_table(&entries).printstd();
            println!();
            println!(
                "Use {} to remove an entry.",
                "researchflow history delete <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Delete {
            id,
            user,
            workspace,
        } => {
            let removed = match (&user, ctx.has_remote()) {
                (Some(user), true) => {
                    let session = ctx.session()?;
                    let ws = workspace.as_deref().unwrap_or(DEFAULT_WORKSPACE);
                    session.delete_search(user, ws, &id).await?
                }
                _ => ctx.store.delete(&id, workspace.as_deref(), user.as_deref())?,
            };
            if removed {
                println!("{}", format!("Deleted history entry {}", id).green());
            } else {
                println!("{}", format!("No history entry with id {}", id).yellow());
            }
        }
        HistoryCommand::Clear { user, workspace } => {
            match (&user, ctx.has_remote()) {
                (Some(user), true) => {
                    let session = ctx.session()?;
                    let ws = workspace.as_deref().unwrap_or(DEFAULT_WORKSPACE);
                    session.clear_workspace(user, ws).await?;
                }
                _ => ctx.store.clear(workspace.as_deref(), user.as_deref())?,
            }
            println!("{}", "Cleared search history.".green());
        }
        HistoryCommand::ClearUser { user } => {
            let removed = ctx.store.clear_all_for_user(&user)?;
            println!(
                "{}",
                format!("Removed {} history partition(s) for {}", removed, user).green()
            );
        }
    }

    Ok(())
}

fn entries_table(entries: &[HistoryEntry]) -> Table {
    let now = Local::now();
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Query".bold(),
        "Results".bold(),
        "Workspace".bold(),
        "When".bold()
    ]);

    for entry in entries {
        table.add_row(prettytable::row![
            short_id(&entry.id).cyan(),
            truncate(&entry.query, QUERY_WIDTH),
            entry.results.len(),
            entry.workspace_id,
            format_relative(entry.timestamp, now)
        ]);
    }
    table
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
