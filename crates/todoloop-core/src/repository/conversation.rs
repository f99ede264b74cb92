//! Conversation repository trait definition.

use chrono::{DateTime, Utc};
use todoloop_types::chat::Conversation;
use todoloop_types::error::RepositoryError;
use uuid::Uuid;

/// Transaction-scoped access to conversations.
pub trait ConversationRepository: Send {
    fn create(
        &mut self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &mut self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// Record activity: sets both `last_message_at` and `updated_at`.
    ///
    /// Returns `RepositoryError::NotFound` when the conversation does not exist.
    fn touch(
        &mut self,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Conversations ordered by most recent activity.
    fn list(
        &mut self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Conversation>, RepositoryError>> + Send;
}
