//! The `ChatModel` trait.
//!
//! Object safe so the orchestrator can hold any provider as
//! `Arc<dyn ChatModel>`.

use std::pin::Pin;

use futures_util::Stream;
use todoloop_types::llm::{LlmError, TurnEvent, TurnRequest};

/// Events of one streaming model turn.
pub type TurnStream = Pin<Box<dyn Stream<Item = Result<TurnEvent, LlmError>> + Send + 'static>>;

pub trait ChatModel: Send + Sync {
    /// Provider name for logging (e.g., "openai").
    fn name(&self) -> &str;

    /// Start a streaming turn.
    ///
    /// A provider that cannot even start the call yields a single `Err`
    /// item. The stream ends after `TurnCompleted`.
    fn stream_turn(&self, request: TurnRequest) -> TurnStream;
}
