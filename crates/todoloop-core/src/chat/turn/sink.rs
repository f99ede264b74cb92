//! Caller-facing event sink.

use todoloop_types::error::SinkError;
use todoloop_types::event::ChatEvent;
use tokio::sync::mpsc;

/// Receives UI events while a turn runs.
///
/// Returning an error aborts the turn.
pub trait EventSink: Send {
    fn emit(&mut self, event: ChatEvent) -> impl std::future::Future<Output = Result<(), SinkError>> + Send;
}

impl EventSink for mpsc::Sender<ChatEvent> {
    async fn emit(&mut self, event: ChatEvent) -> Result<(), SinkError> {
        self.send(event)
            .await
            .map_err(|_| SinkError("receiver dropped".to_string()))
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    async fn emit(&mut self, _event: ChatEvent) -> Result<(), SinkError> {
        Ok(())
    }
}
