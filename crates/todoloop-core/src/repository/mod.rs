//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (todoloop-infra) implements. Repositories are only reachable through a
//! [`unit_of_work::Transaction`], so every write happens inside an atomic
//! transaction. The core crate never depends on any specific storage
//! technology.

pub mod chat_message;
pub mod conversation;
#[cfg(test)]
pub mod memory;
pub mod outbox;
pub mod summary;
pub mod todo;
pub mod unit_of_work;

pub use chat_message::ChatMessageRepository;
pub use conversation::ConversationRepository;
pub use outbox::OutboxRepository;
pub use summary::SummaryRepository;
pub use todo::TodoRepository;
pub use unit_of_work::{Transaction, UnitOfWork};
