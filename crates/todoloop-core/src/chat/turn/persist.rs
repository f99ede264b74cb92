//! Per-turn message writer.
//!
//! Every message of a turn goes through [`TurnWriter::persist`], which runs
//! one transaction: insert the message, enqueue its outbox record, touch the
//! conversation, commit. The sequence counter only advances after a
//! successful commit, so sequence numbers stay gapless even when a write
//! fails and is retried as a failure record.

use todoloop_types::chat::{ChatMessage, MessageState};
use todoloop_types::error::RepositoryError;
use todoloop_types::llm::MessageRole;
use todoloop_types::outbox::OutboxEvent;
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::repository::{
    ChatMessageRepository, ConversationRepository, OutboxRepository, Transaction, UnitOfWork,
};

pub(crate) struct TurnWriter<'a, U> {
    uow: &'a U,
    clock: &'a dyn Clock,
    conversation_id: Uuid,
    turn_id: Uuid,
    next_sequence: u32,
    outbox_max_retries: u32,
}

impl<'a, U: UnitOfWork> TurnWriter<'a, U> {
    pub(crate) fn new(
        uow: &'a U,
        clock: &'a dyn Clock,
        conversation_id: Uuid,
        turn_id: Uuid,
        outbox_max_retries: u32,
    ) -> Self {
        Self {
            uow,
            clock,
            conversation_id,
            turn_id,
            next_sequence: 0,
            outbox_max_retries,
        }
    }

    /// Messages committed so far in this turn.
    pub(crate) fn persisted(&self) -> u32 {
        self.next_sequence
    }

    /// A completed message of this turn, not yet persisted.
    pub(crate) fn draft(&self, id: Uuid, role: MessageRole, content: impl Into<String>) -> ChatMessage {
        let now = self.clock.now();
        ChatMessage {
            id,
            conversation_id: self.conversation_id,
            turn_id: self.turn_id,
            turn_sequence: self.next_sequence,
            role,
            content: content.into(),
            state: MessageState::Completed,
            error: None,
            usage: None,
            action_call_id: None,
            action_calls: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Persist one message with its outbox record and conversation touch.
    ///
    /// The turn fields and sequence number are (re)assigned here.
    pub(crate) async fn persist(&mut self, mut message: ChatMessage) -> Result<ChatMessage, RepositoryError> {
        message.conversation_id = self.conversation_id;
        message.turn_id = self.turn_id;
        message.turn_sequence = self.next_sequence;

        let mut tx = self.uow.begin().await?;
        tx.chat_messages()
            .create_chat_messages(std::slice::from_ref(&message))
            .await?;
        let event = OutboxEvent::chat_message_sent(&message, self.outbox_max_retries, message.created_at);
        tx.outbox().enqueue(&event).await?;
        tx.conversations()
            .touch(&self.conversation_id, message.created_at)
            .await?;
        tx.commit().await?;

        self.next_sequence += 1;
        debug!(
            message_id = %message.id,
            role = %message.role,
            sequence = message.turn_sequence,
            state = %message.state,
            "persisted turn message"
        );
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::repository::memory::{InMemoryUnitOfWork, Operation};
    use todoloop_types::chat::Conversation;

    async fn seeded() -> (InMemoryUnitOfWork, Conversation) {
        let uow = InMemoryUnitOfWork::new();
        let conversation = Conversation::from_first_message("hello", 60, chrono::Utc::now());
        let mut tx = uow.begin().await.unwrap();
        tx.conversations().create(&conversation).await.unwrap();
        tx.commit().await.unwrap();
        (uow, conversation)
    }

    #[tokio::test]
    async fn persist_pairs_message_with_outbox_and_touch() {
        let (uow, conversation) = seeded().await;
        let clock = SystemClock;
        let mut writer = TurnWriter::new(&uow, &clock, conversation.id, Uuid::now_v7(), 5);

        let draft = writer.draft(Uuid::now_v7(), MessageRole::User, "hello");
        let saved = writer.persist(draft).await.unwrap();
        assert_eq!(saved.turn_sequence, 0);
        assert_eq!(writer.persisted(), 1);

        let outbox = uow.outbox_events().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].payload.chat_message_id, saved.id);
        assert_eq!(outbox[0].max_retries, 5);

        let conversations = uow.conversations().await;
        assert_eq!(conversations[0].last_message_at, Some(saved.created_at));
    }

    #[tokio::test]
    async fn failed_insert_leaves_no_outbox_and_keeps_sequence() {
        let (uow, conversation) = seeded().await;
        uow.reject_message_insert(0).await;
        let clock = SystemClock;
        let mut writer = TurnWriter::new(&uow, &clock, conversation.id, Uuid::now_v7(), 5);

        let draft = writer.draft(Uuid::now_v7(), MessageRole::User, "hello");
        assert!(writer.persist(draft).await.is_err());
        assert_eq!(writer.persisted(), 0);
        assert!(uow.outbox_events().await.is_empty());
        assert!(uow.conversations().await[0].last_message_at.is_none());

        let retry = writer.draft(Uuid::now_v7(), MessageRole::User, "hello");
        let saved = writer.persist(retry).await.unwrap();
        assert_eq!(saved.turn_sequence, 0);

        let ops: Vec<Operation> = uow.journal().await.into_iter().map(|e| e.op).collect();
        assert!(!ops.iter().any(|op| matches!(op, Operation::EnqueueOutbox { chat_message_id } if *chat_message_id != saved.id)));
    }
}
