//! Bounded waits for fire-and-forget work
//!
//! [`attempt_with_timeout`] spawns the operation and waits for it at most a
//! fixed duration. When the bound elapses the caller moves on; the operation
//! keeps running in the background and its result is discarded.

use std::future::Future;
use std::time::Duration;

/// Result of a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The operation finished within the bound
    Completed(T),
    /// The bound elapsed first; the operation was left running
    TimedOut,
    /// The operation panicked
    Panicked,
}

impl<T> Attempt<T> {
    /// True when the operation finished in time
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// The value, if the operation finished in time
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::TimedOut | Self::Panicked => None,
        }
    }
}

/// Wait at most `limit` for `operation`
///
/// Never errors or panics past the caller.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use researchflow::timeout::{attempt_with_timeout, Attempt};
///
/// #[tokio::main]
/// async fn main() {
///     let quick = attempt_with_timeout(Duration::from_secs(1), async { 42 }).await;
///     assert_eq!(quick, Attempt::Completed(42));
/// }
/// ```
pub async fn attempt_with_timeout<F>(limit: Duration, operation: F) -> Attempt<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handle = tokio::spawn(operation);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(value)) => Attempt::Completed(value),
        Ok(Err(e)) => {
            tracing::debug!("Bounded operation failed: {}", e);
            Attempt::Panicked
        }
        Err(_) => {
            tracing::debug!(limit_ms = limit.as_millis() as u64, "Bounded operation timed out");
            Attempt::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_completes_within_bound() {
        let attempt = attempt_with_timeout(Duration::from_secs(2), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            "done"
        })
        .await;
        assert_eq!(attempt, Attempt::Completed("done"));
        assert!(attempt.is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_operation_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let attempt = attempt_with_timeout(Duration::from_secs(2), async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
        })
        .await;
        assert_eq!(attempt, Attempt::TimedOut);
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let attempt = attempt_with_timeout(Duration::from_secs(1), async {
            panic!("boom");
        })
        .await;
        assert_eq!(attempt, Attempt::Panicked);
        assert_eq!(attempt.completed(), None);
    }
}
