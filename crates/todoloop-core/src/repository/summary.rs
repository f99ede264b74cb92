//! Conversation summary repository trait definition.
//!
//! The turn orchestrator only reads summaries; `upsert` exists for the
//! summarization process that maintains them.

use todoloop_types::chat::ConversationSummary;
use todoloop_types::error::RepositoryError;
use uuid::Uuid;

pub trait SummaryRepository: Send {
    fn get(
        &mut self,
        conversation_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ConversationSummary>, RepositoryError>> + Send;

    fn upsert(
        &mut self,
        summary: &ConversationSummary,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
