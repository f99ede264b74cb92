//! Chat message repository trait definition.

use todoloop_types::chat::ChatMessage;
use todoloop_types::error::RepositoryError;
use uuid::Uuid;

/// Transaction-scoped access to persisted chat messages.
///
/// Messages are append-only: there is no update or delete.
pub trait ChatMessageRepository: Send {
    /// Insert messages in the given order.
    ///
    /// The turn writer always passes exactly one message so that each
    /// insert is paired with its own outbox record.
    fn create_chat_messages(
        &mut self,
        messages: &[ChatMessage],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// The `limit` most recent messages of a conversation, oldest first.
    fn list_recent(
        &mut self,
        conversation_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Every message of a conversation, ordered by creation.
    fn list_by_conversation(
        &mut self,
        conversation_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Messages of a single turn, ordered by turn sequence.
    fn list_by_turn(
        &mut self,
        turn_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;
}
