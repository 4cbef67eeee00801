//! Endpoint lifecycle events and the event stream that carries them.
//!
//! The event stream is the only channel between the liveness monitor and the
//! rest of the runtime. Events are immutable values; subscribers each get a
//! copy.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default number of events a slow subscriber may lag behind.
const DEFAULT_CAPACITY: usize = 1024;

/// Connection state transition for one remote address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Handshake with `address` completed, the endpoint can send.
    Connected {
        /// Remote node address.
        address: String,
    },
    /// Connection to `address` is gone.
    Terminated {
        /// Remote node address.
        address: String,
    },
}

impl LifecycleEvent {
    /// Address the event refers to.
    pub fn address(&self) -> &str {
        match self {
            LifecycleEvent::Connected { address } | LifecycleEvent::Terminated { address } => {
                address
            }
        }
    }

    /// True for `Terminated` events about `address`.
    pub fn is_terminated_for(&self, address: &str) -> bool {
        matches!(self, LifecycleEvent::Terminated { address: a } if a == address)
    }
}

/// Publish/subscribe bus for [`LifecycleEvent`]s.
///
/// Cloning yields another handle to the same bus. The runtime normally keeps
/// one per process; tests create their own.
#[derive(Debug, Clone)]
pub struct EventStream {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventStream {
    /// Create a bus with the default lag capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus that buffers up to `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Publishing with no subscribers is not an error; the event is dropped.
    pub fn publish(&self, event: LifecycleEvent) {
        tracing::debug!(?event, "publishing lifecycle event");
        let _ = self.sender.send(event);
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}
