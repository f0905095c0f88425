//! Dispatcher event bus.
//!
//! Events are fire-and-forget: publishing never waits on observers, and an
//! observer that falls behind loses the oldest events rather than slowing the
//! dispatcher down.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::transport::SocketStatus;

/// Default number of events buffered per observer.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Notifications emitted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchEvent {
    /// An authenticated request to the home service returned 401.
    MightBeUnlinked,
    /// The multiplexed transport changed state.
    SocketStatusChange(SocketStatus),
    /// The multiplexed transport rejected our credentials.
    UnlinkAndDisconnect,
}

/// Broadcast channel of [`DispatchEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
    /// Creates a bus buffering `capacity` events per observer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `event`, returning how many observers will see it.
    pub fn publish(&self, event: DispatchEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Registers a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    /// Number of live observers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
