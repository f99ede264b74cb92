//! Broadcast event bus for distributing `DomainEvent`s to subscribers.
//!
//! Built on `tokio::sync::broadcast`. Unlike a fire-and-forget bus, a
//! publish that reaches no subscriber is reported as a failure so the outbox
//! relay keeps the record and retries it later.

use todoloop_types::error::PublishError;
use todoloop_types::outbox::DomainEvent;
use tokio::sync::broadcast;

use crate::outbox::EventPublisher;

/// Multi-consumer bus for outbox-published domain events.
///
/// Cloning the bus clones the sender, allowing multiple producers and
/// consumers.
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for EventBus {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        self.sender
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| PublishError::NoSubscribers)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
