use crate::analytics::AnalyticsLogger;
use crate::commands::AppContext;
use crate::error::Result;
use crate::history::{HistoryEntry, DEFAULT_WORKSPACE};
use crate::timeout::Attempt;
use colored::Colorize;

/// Fields of a search to record
#[derive(Debug, Clone, Default)]
pub struct RecordArgs {
    pub query: String,
    pub user: Option<String>,
    pub workspace: Option<String>,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub questions: Vec<String>,
}

impl RecordArgs {
    /// Build the history entry described by these arguments
    pub fn to_entry(&self) -> HistoryEntry {
        HistoryEntry::new(self.query.clone())
            .with_summary(self.summary.clone().unwrap_or_default(), self.key_points.clone())
            .with_questions(self.questions.clone())
            .with_workspace(
                self.workspace
                    .clone()
                    .unwrap_or_else(|| DEFAULT_WORKSPACE.to_string()),
            )
    }
}

/// Record a completed search
///
/// The local write goes through the debounced writer and lands when the
/// process flushes on exit. With a signed-in user and a configured remote
/// store the entry is also mirrored to the cloud. A search event is sent
/// when analytics are enabled.
pub async fn run_record(ctx: &AppContext, args: RecordArgs) -> Result<()> {
    let entry = args.to_entry();
    let id = entry.id.clone();
    let (workspace, query, results) = (
        entry.workspace_id.clone(),
        entry.query.clone(),
        entry.results.len(),
    );

    match (&args.user, ctx.has_remote()) {
        (Some(user), true) => {
            let session = ctx.session()?;
            match session.record_search(user, entry).await {
                Attempt::Completed(true) => {
                    println!("{}", format!("Recorded {} (synced)", id).green())
                }
                Attempt::Completed(false) | Attempt::Panicked => println!(
                    "{}",
                    format!("Recorded {} locally; cloud sync failed", id).yellow()
                ),
                Attempt::TimedOut => println!(
                    "{}",
                    format!("Recorded {} locally; cloud sync still pending", id).yellow()
                ),
            }
        }
        _ => {
            ctx.coalescer
                .schedule_save(entry, Some(&workspace), args.user.as_deref());
            println!("{}", format!("Recorded {}", id).green());
        }
    }

    let analytics = AnalyticsLogger::new(&ctx.config.analytics)?;
    if analytics.is_enabled() {
        analytics.log_search(&workspace, &query, results, 0).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_entry_fills_fields() {
        let args = RecordArgs {
            query: "rust".to_string(),
            workspace: Some("ws1".to_string()),
            summary: Some("summary".to_string()),
            key_points: vec!["k".to_string()],
            questions: vec!["q?".to_string()],
            ..RecordArgs::default()
        };
        let entry = args.to_entry();
        assert_eq!(entry.query, "rust");
        assert_eq!(entry.workspace_id, "ws1");
        assert_eq!(entry.summary.key_points, vec!["k"]);
        assert_eq!(entry.questions, vec!["q?"]);
    }

    #[test]
    fn test_to_entry_defaults_workspace() {
        let args = RecordArgs {
            query: "rust".to_string(),
            ..RecordArgs::default()
        };
        assert_eq!(args.to_entry().workspace_id, DEFAULT_WORKSPACE);
    }
}
