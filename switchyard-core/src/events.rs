//! Lifecycle events published by the router.
//!
//! Observers call [`EventBus::subscribe`] and receive every event emitted
//! afterwards. Emission never blocks; a subscriber that falls more than the
//! channel capacity behind gets `RecvError::Lagged` and skips ahead.

use serde::Serialize;
use tokio::sync::broadcast;

/// Something an external observer may want to react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouterEvent {
    /// Router finished its initial probe round.
    Initialized {
        /// Registered provider names, in registration order.
        providers: Vec<String>,
    },
    /// A provider went from unavailable to available.
    ProviderHealthy {
        /// Provider name.
        name: String,
    },
    /// A provider went from available to unavailable.
    ProviderUnhealthy {
        /// Provider name.
        name: String,
        /// The error that triggered the transition.
        error: String,
    },
    /// A request gave up on one candidate and moved on.
    Fallback {
        /// `complete`, `stream` or `embed`.
        operation: &'static str,
        /// The abandoned provider.
        from: String,
        /// Attempts spent on it.
        attempts: u32,
    },
    /// Router shut down.
    Shutdown,
}

/// Publish-subscribe fan-out for [`RouterEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RouterEvent>,
}

impl EventBus {
    /// Create a bus that buffers up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new observer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers. No subscribers is not an error.
    pub fn emit(&self, event: RouterEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
