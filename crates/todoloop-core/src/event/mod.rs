//! Event bus for published domain events.
//!
//! Provides an `EventBus` that distributes `DomainEvent`s to all
//! subscribers via a `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::EventBus;
