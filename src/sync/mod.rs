//! Cloud side of the history subsystem
//!
//! - `remote`: store traits and row formats
//! - `rest`: PostgREST HTTP client
//! - `memory`: in-process remote for tests and offline use
//! - `guard`: per-user run-once state tokens
//! - `reconcile`: merging cloud history into local partitions
//! - `migration`: one-time workspace and notes migration

pub mod guard;
pub mod memory;
pub mod migration;
pub mod reconcile;
pub mod remote;
pub mod rest;

pub use guard::{GuardState, GuardToken, RunOnceGuards};
pub use memory::{InMemoryRemote, NoteRecord};
pub use migration::{migration_flag_key, MigrationOutcome, Migrator};
pub use reconcile::{group_by_workspace, merge_history, CloudHistory, CloudSync, ReconcileOutcome};
pub use remote::{
    HistoryRow, RemoteHistoryStore, RemoteNotesStore, RemoteWorkspaceStore, WorkspaceRow,
    WORKSPACE_FETCH_LIMIT,
};
pub use rest::RestRemoteStore;
