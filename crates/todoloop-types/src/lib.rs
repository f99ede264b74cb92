//! Shared domain types for todoloop.
//!
//! Conversations, chat messages, outbox records, todos, model turn events and
//! their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod llm;
pub mod outbox;
pub mod todo;
