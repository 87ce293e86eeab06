//! Event bus routing helpers.

use tokio::sync::broadcast::{self, Sender};
use tokio_stream::wrappers::BroadcastStream;

use crate::payloads::{DEFAULT_BUS_CAPACITY, Event};

/// Stream wrapper used by subscribers.
pub type EventStream = BroadcastStream<Event>;

/// Shared fire-and-forget event bus built on top of `tokio::broadcast`.
///
/// Subscribers only observe events published after they subscribed; a
/// subscriber that falls behind the channel capacity loses the oldest events.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<Event>,
}

impl EventBus {
    /// Construct a bus with a custom channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Construct a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Publish an event to every current subscriber.
    ///
    /// Never blocks; returns the number of subscribers that will observe the
    /// event (zero when nobody is listening).
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
