//! Typed publish/subscribe channel shared by locators and services.

use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of each broadcast channel.
pub const CHANNEL_CAPACITY: usize = 256;

/// Broadcaster for one event type.
///
/// Sending never blocks; receivers that fall more than the channel capacity
/// behind observe a lag error and skip ahead.
#[derive(Debug)]
pub struct EventBroadcaster<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone + std::fmt::Debug> EventBroadcaster<T> {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Deliver `event` to every current subscriber.
    pub fn broadcast(&self, event: T) {
        if self.sender.receiver_count() > 0 {
            trace!(?event, "Broadcasting event");
            let _ = self.sender.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// A cloneable handle that can publish from other tasks or threads.
    pub fn sender(&self) -> broadcast::Sender<T> {
        self.sender.clone()
    }
}

impl<T: Clone + std::fmt::Debug> Default for EventBroadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}
