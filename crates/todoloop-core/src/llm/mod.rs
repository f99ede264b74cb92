//! Streaming chat model abstraction.
//!
//! The orchestrator consumes a model turn as a stream of typed
//! [`TurnEvent`](todoloop_types::llm::TurnEvent)s. Provider adapters live
//! outside this crate; anything that can produce that stream can drive a turn.

pub mod model;

pub use model::{ChatModel, TurnStream};
