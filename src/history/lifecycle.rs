use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Page/process lifecycle events that force pending writes to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleSignal {
    /// The view was hidden or backgrounded
    Hidden,
    /// The process or page is going away
    Unload,
    /// The view became visible again
    Visible,
}

impl LifecycleSignal {
    /// Whether this signal requires flushing every pending write
    pub fn requires_flush(self) -> bool {
        matches!(self, Self::Hidden | Self::Unload)
    }
}

/// Broadcast source of [`LifecycleSignal`]s
///
/// Cloning the hub shares the same channel.
#[derive(Debug, Clone)]
pub struct LifecycleHub {
    sender: broadcast::Sender<LifecycleSignal>,
}

impl LifecycleHub {
    /// Create a hub buffering up to `capacity` undelivered signals per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send a signal to every subscriber
    ///
    /// Returns the number of subscribers that received it; zero when nobody
    /// is listening.
    pub fn emit(&self, signal: LifecycleSignal) -> usize {
        match self.sender.send(signal) {
            Ok(receivers) => {
                tracing::debug!(?signal, receivers, "Lifecycle signal emitted");
                receivers
            }
            Err(_) => {
                tracing::debug!(?signal, "Lifecycle signal dropped, no subscribers");
                0
            }
        }
    }

    /// Subscribe to future signals
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.sender.subscribe()
    }
}

impl Default for LifecycleHub {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_flush() {
        assert!(LifecycleSignal::Hidden.requires_flush());
        assert!(LifecycleSignal::Unload.requires_flush());
        assert!(!LifecycleSignal::Visible.requires_flush());
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let hub = LifecycleHub::default();
        assert_eq!(hub.emit(LifecycleSignal::Hidden), 0);

        let mut rx = hub.subscribe();
        assert_eq!(hub.emit(LifecycleSignal::Unload), 1);
        assert_eq!(rx.recv().await.unwrap(), LifecycleSignal::Unload);
    }
}
