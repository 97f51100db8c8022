//! Search history: entries, the bounded local store, and the debounced writer
//!
//! - `types`: `HistoryEntry`, `Workspace` and friends
//! - `validation`: shape checks and best-effort repair of persisted entries
//! - `store`: per-user, per-workspace partitions with count and size caps
//! - `groups`: day bucketing for display
//! - `coalescer`: debounced writes with lifecycle-driven flushing
//! - `lifecycle`: hide/unload/visible signals

pub mod coalescer;
pub mod groups;
pub mod lifecycle;
pub mod store;
pub mod types;
pub mod validation;

pub use coalescer::WriteCoalescer;
pub use groups::{format_relative, group_by_day, HistoryGroups};
pub use lifecycle::{LifecycleHub, LifecycleSignal};
pub use store::{partition_key, short_user_id, HistoryStore, SaveOutcome};
pub use types::{new_entry_id, HistoryEntry, SearchResult, Summary, Workspace, DEFAULT_WORKSPACE};
pub use validation::{is_valid_history_entry, repair_entry};
