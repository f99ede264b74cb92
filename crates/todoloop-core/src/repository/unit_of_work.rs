//! Unit-of-work abstraction.
//!
//! A [`UnitOfWork`] opens [`Transaction`]s. Repositories borrowed from a
//! transaction are only valid while it is alive; `commit` makes every write
//! durable at once, and dropping an uncommitted transaction rolls it back.
//!
//! ```ignore
//! let mut tx = uow.begin().await?;
//! tx.chat_messages().create_chat_messages(&[message]).await?;
//! tx.outbox().enqueue(&event).await?;
//! tx.commit().await?;
//! ```

use todoloop_types::error::RepositoryError;

use super::{
    ChatMessageRepository, ConversationRepository, OutboxRepository, SummaryRepository,
    TodoRepository,
};

/// Opens atomic transactions over the application store.
///
/// Implementations are cheap to clone handles onto a shared store.
pub trait UnitOfWork: Send + Sync {
    type Tx: Transaction;

    fn begin(&self) -> impl std::future::Future<Output = Result<Self::Tx, RepositoryError>> + Send;
}

/// One open transaction with its scoped repositories.
pub trait Transaction: Send + Sized {
    type ChatMessages<'t>: ChatMessageRepository
    where
        Self: 't;
    type Outbox<'t>: OutboxRepository
    where
        Self: 't;
    type Conversations<'t>: ConversationRepository
    where
        Self: 't;
    type Summaries<'t>: SummaryRepository
    where
        Self: 't;
    type Todos<'t>: TodoRepository
    where
        Self: 't;

    fn chat_messages(&mut self) -> Self::ChatMessages<'_>;

    fn outbox(&mut self) -> Self::Outbox<'_>;

    fn conversations(&mut self) -> Self::Conversations<'_>;

    fn summaries(&mut self) -> Self::Summaries<'_>;

    fn todos(&mut self) -> Self::Todos<'_>;

    fn commit(self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
