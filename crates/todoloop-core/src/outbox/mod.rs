//! Outbox relay: publishes pending outbox records to the event bus.

pub mod relay;

pub use relay::{EventPublisher, OutboxRelay, RelayReport};
