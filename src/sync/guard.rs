use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Per-user progress of a run-once task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardState {
    /// Not started in this session
    #[default]
    Idle,
    /// Currently running
    InFlight,
    /// Finished in this session
    Done,
}

/// Per-user run-once state tokens
///
/// A task may start for a user only from [`GuardState::Idle`]; a second
/// attempt while it is in flight or after it finished is refused rather than
/// queued. Clones share state.
///
/// A token only ever updates the state it started. After [`RunOnceGuards::reset`]
/// a token still in flight completes or drops without touching the user, so
/// the next attempt is not skipped.
///
/// # Examples
///
/// ```
/// use researchflow::sync::{GuardState, RunOnceGuards};
///
/// let guards = RunOnceGuards::new();
/// let token = guards.try_begin("user-1").unwrap();
/// assert!(guards.try_begin("user-1").is_none());
/// token.complete();
/// assert_eq!(guards.state("user-1"), GuardState::Done);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RunOnceGuards {
    states: Arc<Mutex<HashMap<String, Slot>>>,
    next_epoch: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: GuardState,
    epoch: u64,
}

impl RunOnceGuards {
    /// Create guards with every user idle
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for `user_id`
    pub fn state(&self, user_id: &str) -> GuardState {
        self.lock()
            .get(user_id)
            .map(|slot| slot.state)
            .unwrap_or_default()
    }

    /// Move `user_id` from idle to in-flight
    ///
    /// Returns `None` when the task is already running or done. Dropping the
    /// returned token without calling [`GuardToken::complete`] puts the user
    /// back to idle so a later attempt can retry.
    pub fn try_begin(&self, user_id: &str) -> Option<GuardToken> {
        let mut states = self.lock();
        if let Some(slot) = states.get(user_id) {
            if slot.state != GuardState::Idle {
                tracing::debug!(user = %user_id, state = ?slot.state, "Run-once task skipped");
                return None;
            }
        }
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        states.insert(
            user_id.to_string(),
            Slot {
                state: GuardState::InFlight,
                epoch,
            },
        );
        Some(GuardToken {
            guards: self.clone(),
            user_id: user_id.to_string(),
            epoch,
            completed: false,
        })
    }

    /// Forget the state of `user_id` (used on sign-out)
    pub fn reset(&self, user_id: &str) {
        self.lock().remove(user_id);
    }

    /// Settle the in-flight state started by `epoch`; stale tokens are ignored
    fn settle(&self, user_id: &str, epoch: u64, state: GuardState) {
        let mut states = self.lock();
        match states.get_mut(user_id) {
            Some(slot) if slot.epoch == epoch && slot.state == GuardState::InFlight => {
                slot.state = state;
            }
            _ => tracing::debug!(user = %user_id, "Run-once token outlived a reset"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof that a run-once task is in flight for one user
#[derive(Debug)]
#[must_use = "dropping the token immediately returns the user to idle"]
pub struct GuardToken {
    guards: RunOnceGuards,
    user_id: String,
    epoch: u64,
    completed: bool,
}

impl GuardToken {
    /// User this token belongs to
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Mark the task done for the rest of the session
    pub fn complete(mut self) {
        self.completed = true;
        self.guards.settle(&self.user_id, self.epoch, GuardState::Done);
    }
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        if !self.completed {
            self.guards.settle(&self.user_id, self.epoch, GuardState::Idle);
        }
    }
}
