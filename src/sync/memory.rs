use crate::error::{Result, ResearchFlowError};
use crate::history::{HistoryEntry, Workspace};
use crate::sync::remote::{RemoteHistoryStore, RemoteNotesStore, RemoteWorkspaceStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A knowledge note as far as ownership is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub id: String,
    pub workspace_id: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Default)]
struct RemoteState {
    // (user, entry); kept in insertion order, sorted on read
    history: Vec<(String, HistoryEntry)>,
    workspaces: HashMap<(String, String), Workspace>,
    notes: Vec<NoteRecord>,
}

/// In-process remote store
///
/// Implements every remote trait over shared in-memory state, with switches
/// to make reads or writes fail, to answer workspace upserts with a
/// conflict, and to delay every call.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    workspace_conflict: AtomicBool,
    latency: Mutex<Option<Duration>>,
    fetch_all_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
}

impl InMemoryRemote {
    /// Create an empty remote
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` for `user_id` as if another device had mirrored it
    pub fn seed_history(&self, user_id: &str, entry: HistoryEntry) {
        let mut state = self.lock();
        state
            .history
            .retain(|(user, existing)| !(user == user_id && existing.id == entry.id));
        state.history.push((user_id.to_string(), entry));
    }

    /// Add a note, optionally without an owner
    pub fn seed_note(&self, id: &str, workspace_id: &str, user_id: Option<&str>) {
        self.lock().notes.push(NoteRecord {
            id: id.to_string(),
            workspace_id: workspace_id.to_string(),
            user_id: user_id.map(str::to_string),
        });
    }

    /// Every entry stored for `user_id`, newest first
    pub fn history_for(&self, user_id: &str) -> Vec<HistoryEntry> {
        let state = self.lock();
        newest_first(
            state
                .history
                .iter()
                .filter(|(user, _)| user == user_id)
                .map(|(_, entry)| entry.clone()),
        )
    }

    /// Workspaces stored for `user_id`, ordered by id
    pub fn workspaces_for(&self, user_id: &str) -> Vec<Workspace> {
        let state = self.lock();
        let mut workspaces: Vec<Workspace> = state
            .workspaces
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, ws)| ws.clone())
            .collect();
        workspaces.sort_by(|a, b| a.id.cmp(&b.id));
        workspaces
    }

    /// Snapshot of every note
    pub fn notes(&self) -> Vec<NoteRecord> {
        self.lock().notes.clone()
    }

    /// Make every read fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Answer workspace upserts with a conflict
    pub fn conflict_on_workspaces(&self, conflict: bool) {
        self.workspace_conflict.store(conflict, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Number of `fetch_all` calls served (including failed ones)
    pub fn fetch_all_calls(&self) -> usize {
        self.fetch_all_calls.load(Ordering::SeqCst)
    }

    /// Number of history upserts served (including failed ones)
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        let latency = *self
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn check_read(&self) -> Result<()> {
        self.simulate_latency().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ResearchFlowError::Remote("injected read failure".to_string()).into());
        }
        Ok(())
    }

    async fn check_write(&self) -> Result<()> {
        self.simulate_latency().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ResearchFlowError::Remote("injected write failure".to_string()).into());
        }
        Ok(())
    }
}

fn newest_first(entries: impl Iterator<Item = HistoryEntry>) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = entries.collect();
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries
}

#[async_trait]
impl RemoteHistoryStore for InMemoryRemote {
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        self.fetch_all_calls.fetch_add(1, Ordering::SeqCst);
        self.check_read().await?;
        Ok(self.history_for(user_id))
    }

    async fn fetch_workspace(
        &self,
        user_id: &str,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        self.check_read().await?;
        let mut entries: Vec<HistoryEntry> = self
            .history_for(user_id)
            .into_iter()
            .filter(|entry| entry.workspace_id == workspace_id)
            .collect();
        entries.truncate(limit);
        Ok(entries)
    }

    async fn upsert(&self, user_id: &str, entry: &HistoryEntry) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write().await?;
        self.seed_history(user_id, entry.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &str, entry_id: &str) -> Result<()> {
        self.check_write().await?;
        self.lock()
            .history
            .retain(|(user, entry)| !(user == user_id && entry.id == entry_id));
        Ok(())
    }

    async fn clear_workspace(&self, user_id: &str, workspace_id: &str) -> Result<()> {
        self.check_write().await?;
        self.lock()
            .history
            .retain(|(user, entry)| !(user == user_id && entry.workspace_id == workspace_id));
        Ok(())
    }
}

#[async_trait]
impl RemoteWorkspaceStore for InMemoryRemote {
    async fn upsert_many(&self, user_id: &str, workspaces: &[Workspace]) -> Result<()> {
        self.check_write().await?;
        if self.workspace_conflict.load(Ordering::SeqCst) {
            return Err(
                ResearchFlowError::Conflict("duplicate key value in user_workspaces".into()).into(),
            );
        }
        let mut state = self.lock();
        for ws in workspaces {
            state
                .workspaces
                .insert((user_id.to_string(), ws.id.clone()), ws.clone());
        }
        Ok(())
    }

    async fn delete(&self, user_id: &str, workspace_id: &str) -> Result<()> {
        self.check_write().await?;
        self.lock()
            .workspaces
            .remove(&(user_id.to_string(), workspace_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl RemoteNotesStore for InMemoryRemote {
    async fn assign_orphaned(&self, user_id: &str, workspace_ids: &[String]) -> Result<()> {
        self.check_write().await?;
        for note in self.lock().notes.iter_mut() {
            if note.user_id.is_none() && workspace_ids.contains(&note.workspace_id) {
                note.user_id = Some(user_id.to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::entry_with;

    #[tokio::test]
    async fn test_fetch_all_is_newest_first_and_per_user() {
        let remote = InMemoryRemote::new();
        remote.seed_history("u1", entry_with("old", 1));
        remote.seed_history("u1", entry_with("new", 5));
        remote.seed_history("u2", entry_with("other", 3));

        let ids: Vec<_> = remote
            .fetch_all("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(remote.fetch_all_calls(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let remote = InMemoryRemote::new();
        remote.upsert("u1", &entry_with("a", 1)).await.unwrap();
        let mut updated = entry_with("a", 2);
        updated.query = "updated".to_string();
        remote.upsert("u1", &updated).await.unwrap();

        let history = remote.history_for("u1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "updated");
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let remote = InMemoryRemote::new();
        remote.fail_reads(true);
        assert!(remote.fetch_all("u1").await.is_err());

        remote.fail_writes(true);
        assert!(remote.upsert("u1", &entry_with("a", 1)).await.is_err());
        assert!(remote.history_for("u1").is_empty());

        remote.fail_writes(false);
        remote.conflict_on_workspaces(true);
        let err = remote
            .upsert_many("u1", &[Workspace::new("ws", "Ws")])
            .await
            .unwrap_err();
        assert!(err
            .downcast_ref::<ResearchFlowError>()
            .is_some_and(ResearchFlowError::is_conflict));
    }

    #[tokio::test]
    async fn test_assign_orphaned_only_touches_listed_workspaces() {
        let remote = InMemoryRemote::new();
        remote.seed_note("n1", "ws1", None);
        remote.seed_note("n2", "ws2", None);
        remote.seed_note("n3", "ws1", Some("someone"));

        remote
            .assign_orphaned("u1", &["ws1".to_string()])
            .await
            .unwrap();

        let notes = remote.notes();
        assert_eq!(notes[0].user_id.as_deref(), Some("u1"));
        assert_eq!(notes[1].user_id, None);
        assert_eq!(notes[2].user_id.as_deref(), Some("someone"));
    }
}
