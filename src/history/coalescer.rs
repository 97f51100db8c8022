//! Debounced history writes
//!
//! Rapid repeated saves for the same partition are coalesced into a single
//! store write once the partition has been quiet for the debounce interval.
//! Pending writes are forced out on [`LifecycleSignal::Hidden`] and
//! [`LifecycleSignal::Unload`].

use crate::history::lifecycle::LifecycleSignal;
use crate::history::store::{HistoryStore, SaveOutcome};
use crate::history::types::HistoryEntry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

struct PendingWrite {
    entry: HistoryEntry,
    workspace_id: Option<String>,
    user_id: Option<String>,
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner {
    store: Arc<HistoryStore>,
    delay: Duration,
    pending: Mutex<HashMap<String, PendingWrite>>,
    next_generation: AtomicU64,
    lifecycle_attached: AtomicBool,
}

/// Per-partition debounced writer in front of a [`HistoryStore`]
///
/// Cheap to clone; clones share the same pending set. Scheduling requires a
/// running tokio runtime because every key gets its own timer task.
#[derive(Clone)]
pub struct WriteCoalescer {
    inner: Arc<Inner>,
}

impl WriteCoalescer {
    /// Create a coalescer writing to `store` after `delay` of quiet
    pub fn new(store: Arc<HistoryStore>, delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                delay,
                pending: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                lifecycle_attached: AtomicBool::new(false),
            }),
        }
    }

    /// The store pending writes are flushed to
    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.inner.store
    }

    /// Queue a save, replacing any pending save for the same partition
    ///
    /// The partition's timer restarts; when it expires only that partition
    /// is written, with the arguments of the most recent call.
    pub fn schedule_save(
        &self,
        entry: HistoryEntry,
        workspace_id: Option<&str>,
        user_id: Option<&str>,
    ) {
        let key = self.inner.store.partition_key(workspace_id, user_id);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        // Held until the write is registered so the timer cannot fire first.
        let mut pending = self.inner.lock();
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.delay;
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.flush_key(&timer_key, generation);
            }
        });

        let write = PendingWrite {
            entry,
            workspace_id: workspace_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
            generation,
            timer,
        };

        if let Some(previous) = pending.insert(key.clone(), write) {
            previous.timer.abort();
            tracing::trace!(key = %key, "Coalesced pending history write");
        }
    }

    /// Cancel every timer and write every pending partition now
    ///
    /// Returns the number of partitions written.
    pub fn flush_all(&self) -> usize {
        let drained: Vec<(String, PendingWrite)> = self.inner.lock().drain().collect();
        let count = drained.len();
        for (key, write) in drained {
            write.timer.abort();
            self.inner.write(&key, write);
        }
        if count > 0 {
            tracing::debug!(count, "Flushed pending history writes");
        }
        count
    }

    /// Discard the pending write for one partition
    ///
    /// Returns whether a write was pending.
    pub fn cancel(&self, workspace_id: Option<&str>, user_id: Option<&str>) -> bool {
        let key = self.inner.store.partition_key(workspace_id, user_id);
        match self.inner.lock().remove(&key) {
            Some(write) => {
                write.timer.abort();
                tracing::debug!(key = %key, "Cancelled pending history write");
                true
            }
            None => false,
        }
    }

    /// Number of partitions with a write waiting on its timer
    pub fn pending_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Flush on `Hidden`/`Unload` signals from `signals`
    ///
    /// Only the first registration takes effect for the lifetime of the
    /// coalescer; later calls return `false` and drop their receiver.
    pub fn attach_lifecycle(&self, mut signals: broadcast::Receiver<LifecycleSignal>) -> bool {
        if self.inner.lifecycle_attached.swap(true, Ordering::SeqCst) {
            tracing::debug!("Lifecycle listener already registered");
            return false;
        }

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let flush = match signals.recv().await {
                    Ok(signal) => signal.requires_flush(),
                    // A missed signal may have been an unload.
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Lifecycle listener lagged, flushing");
                        true
                    }
                    Err(RecvError::Closed) => break,
                };
                if !flush {
                    continue;
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                WriteCoalescer { inner }.flush_all();
            }
            tracing::debug!("Lifecycle listener stopped");
        });
        true
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingWrite>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush_key(&self, key: &str, generation: u64) {
        let write = {
            let mut pending = self.lock();
            match pending.get(key) {
                Some(write) if write.generation == generation => pending.remove(key),
                _ => None,
            }
        };
        if let Some(write) = write {
            self.write(key, write);
        }
    }

    fn write(&self, key: &str, write: PendingWrite) {
        let outcome = self.store.save(
            &write.entry,
            write.workspace_id.as_deref(),
            write.user_id.as_deref(),
        );
        match outcome {
            SaveOutcome::Saved { kept } => {
                tracing::debug!(key = %key, kept, "Debounced history write")
            }
            SaveOutcome::Trimmed { kept } | SaveOutcome::QuotaFallback { kept } => {
                tracing::info!(key = %key, kept, "Debounced history write trimmed")
            }
            SaveOutcome::Rejected | SaveOutcome::Failed => {
                tracing::warn!(key = %key, ?outcome, "Debounced history write not stored")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::history::lifecycle::LifecycleHub;
    use crate::test_utils::CountingKeyValueStore;
    use tokio::time::sleep;

    fn coalescer() -> (WriteCoalescer, Arc<CountingKeyValueStore>) {
        let kv = Arc::new(CountingKeyValueStore::new());
        let store = Arc::new(HistoryStore::new(kv.clone(), StorageConfig::default()));
        (
            WriteCoalescer::new(store, Duration::from_millis(300)),
            kv,
        )
    }

    fn entry(id: &str, query: &str) -> HistoryEntry {
        let mut e = HistoryEntry::new(query);
        e.id = id.to_string();
        e
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_saves_coalesce_into_one_write() {
        let (coalescer, kv) = coalescer();

        coalescer.schedule_save(entry("a", "first"), Some("ws"), Some("user-1"));
        sleep(Duration::from_millis(100)).await;
        coalescer.schedule_save(entry("a", "second"), Some("ws"), Some("user-1"));
        sleep(Duration::from_millis(100)).await;
        coalescer.schedule_save(entry("b", "third"), Some("ws"), Some("user-1"));
        assert_eq!(kv.set_count(), 0);

        sleep(Duration::from_millis(350)).await;
        assert_eq!(kv.set_count(), 1);
        assert_eq!(coalescer.pending_count(), 0);

        let loaded = coalescer.store().load(Some("ws"), Some("user-1"));
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "b");
        assert_eq!(loaded[0].query, "third");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_restarts_on_each_schedule() {
        let (coalescer, kv) = coalescer();

        coalescer.schedule_save(entry("a", "q"), None, None);
        sleep(Duration::from_millis(250)).await;
        coalescer.schedule_save(entry("a", "q2"), None, None);
        sleep(Duration::from_millis(250)).await;
        assert_eq!(kv.set_count(), 0);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(kv.set_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_flush_independently() {
        let (coalescer, kv) = coalescer();

        coalescer.schedule_save(entry("a", "q"), Some("ws1"), Some("user-1"));
        coalescer.schedule_save(entry("b", "q"), Some("ws2"), Some("user-1"));
        assert_eq!(coalescer.pending_count(), 2);

        sleep(Duration::from_millis(400)).await;
        assert_eq!(kv.set_count(), 2);
        assert_eq!(coalescer.store().load(Some("ws1"), Some("user-1")).len(), 1);
        assert_eq!(coalescer.store().load(Some("ws2"), Some("user-1")).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_all_writes_every_pending_key() {
        let (coalescer, kv) = coalescer();

        coalescer.schedule_save(entry("a", "q"), Some("ws1"), None);
        coalescer.schedule_save(entry("b", "q"), Some("ws2"), None);

        assert_eq!(coalescer.flush_all(), 2);
        assert_eq!(coalescer.pending_count(), 0);
        assert_eq!(kv.set_count(), 2);

        // The aborted timers must not write again.
        sleep(Duration::from_millis(500)).await;
        assert_eq!(kv.set_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending_write() {
        let (coalescer, kv) = coalescer();

        coalescer.schedule_save(entry("a", "q"), Some("ws"), Some("user-1"));
        assert!(coalescer.cancel(Some("ws"), Some("user-1")));
        assert!(!coalescer.cancel(Some("ws"), Some("user-1")));

        sleep(Duration::from_millis(500)).await;
        assert_eq!(kv.set_count(), 0);
        assert!(coalescer.store().load(Some("ws"), Some("user-1")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_signal_flushes() {
        let (coalescer, kv) = coalescer();
        let hub = LifecycleHub::default();
        assert!(coalescer.attach_lifecycle(hub.subscribe()));

        coalescer.schedule_save(entry("a", "q"), None, None);
        hub.emit(LifecycleSignal::Visible);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(kv.set_count(), 0);

        hub.emit(LifecycleSignal::Hidden);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(kv.set_count(), 1);
        assert_eq!(coalescer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_registers_once() {
        let (coalescer, kv) = coalescer();
        let hub = LifecycleHub::default();

        assert!(coalescer.attach_lifecycle(hub.subscribe()));
        assert!(!coalescer.clone().attach_lifecycle(hub.subscribe()));

        coalescer.schedule_save(entry("a", "q"), None, None);
        hub.emit(LifecycleSignal::Unload);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(kv.set_count(), 1);
    }
}
