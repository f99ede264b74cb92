//! In-memory unit of work.
//!
//! Holds the whole store behind one async mutex. A transaction owns the lock
//! for its lifetime and keeps a snapshot taken at `begin`; dropping it
//! without `commit` restores the snapshot. Transactions are therefore
//! serialized, like the single SQLite writer connection.
//!
//! Every write is appended to a journal (which survives rollback) and a few
//! faults can be injected, so tests can assert how writes were grouped into
//! transactions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use todoloop_types::chat::{ChatMessage, Conversation, ConversationSummary};
use todoloop_types::error::RepositoryError;
use todoloop_types::outbox::{OutboxEvent, OutboxStats, OutboxStatus};
use todoloop_types::todo::{Todo, TodoFilter};
use uuid::Uuid;

use super::{
    ChatMessageRepository, ConversationRepository, OutboxRepository, SummaryRepository,
    TodoRepository, Transaction, UnitOfWork,
};

/// A single journaled operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Begin,
    CreateConversation { conversation_id: Uuid },
    CreateChatMessage { message_id: Uuid, turn_sequence: u32 },
    CreateChatMessageRejected { message_id: Uuid },
    EnqueueOutbox { chat_message_id: Uuid },
    TouchConversation { conversation_id: Uuid },
    Commit,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub tx_id: u64,
    pub op: Operation,
}

#[derive(Debug, Clone, Default)]
struct MemoryData {
    conversations: Vec<Conversation>,
    messages: Vec<ChatMessage>,
    summaries: HashMap<Uuid, ConversationSummary>,
    outbox: Vec<OutboxEvent>,
    todos: Vec<Todo>,
}

#[derive(Debug, Default)]
struct Faults {
    /// 0-based indices of message insert attempts that fail.
    rejected_message_inserts: Vec<usize>,
    fail_outbox_claim: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    data: MemoryData,
    journal: Vec<JournalEntry>,
    faults: Faults,
    next_tx_id: u64,
    message_insert_attempts: usize,
}

impl MemoryState {
    fn record(&mut self, tx_id: u64, op: Operation) {
        self.journal.push(JournalEntry { tx_id, op });
    }
}

/// Shared in-memory store. Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUnitOfWork {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryUnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `attempt`-th message insert (0-based, counted across all
    /// transactions) fail with a query error.
    pub async fn reject_message_insert(&self, attempt: usize) {
        self.state
            .lock()
            .await
            .faults
            .rejected_message_inserts
            .push(attempt);
    }

    /// Make every outbox claim fail until cleared.
    pub async fn set_outbox_claim_failure(&self, fail: bool) {
        self.state.lock().await.faults.fail_outbox_claim = fail;
    }

    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.state.lock().await.journal.clone()
    }

    /// All committed messages in insertion order.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.data.messages.clone()
    }

    pub async fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.state.lock().await.data.outbox.clone()
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.data.conversations.clone()
    }
}

impl UnitOfWork for InMemoryUnitOfWork {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction, RepositoryError> {
        let mut state = self.state.clone().lock_owned().await;
        let tx_id = state.next_tx_id;
        state.next_tx_id += 1;
        state.record(tx_id, Operation::Begin);
        let snapshot = state.data.clone();
        Ok(InMemoryTransaction {
            state,
            snapshot: Some(snapshot),
            tx_id,
        })
    }
}

/// An open in-memory transaction holding the store lock.
pub struct InMemoryTransaction {
    state: OwnedMutexGuard<MemoryState>,
    /// `None` once committed.
    snapshot: Option<MemoryData>,
    tx_id: u64,
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.state.data = snapshot;
            let tx_id = self.tx_id;
            self.state.record(tx_id, Operation::Rollback);
        }
    }
}

impl Transaction for InMemoryTransaction {
    type ChatMessages<'t> = MemoryChatMessages<'t>;
    type Outbox<'t> = MemoryOutbox<'t>;
    type Conversations<'t> = MemoryConversations<'t>;
    type Summaries<'t> = MemorySummaries<'t>;
    type Todos<'t> = MemoryTodos<'t>;

    fn chat_messages(&mut self) -> MemoryChatMessages<'_> {
        MemoryChatMessages {
            state: &mut self.state,
            tx_id: self.tx_id,
        }
    }

    fn outbox(&mut self) -> MemoryOutbox<'_> {
        MemoryOutbox {
            state: &mut self.state,
            tx_id: self.tx_id,
        }
    }

    fn conversations(&mut self) -> MemoryConversations<'_> {
        MemoryConversations {
            state: &mut self.state,
            tx_id: self.tx_id,
        }
    }

    fn summaries(&mut self) -> MemorySummaries<'_> {
        MemorySummaries {
            state: &mut self.state,
        }
    }

    fn todos(&mut self) -> MemoryTodos<'_> {
        MemoryTodos {
            state: &mut self.state,
        }
    }

    async fn commit(mut self) -> Result<(), RepositoryError> {
        self.snapshot = None;
        let tx_id = self.tx_id;
        self.state.record(tx_id, Operation::Commit);
        Ok(())
    }
}

pub struct MemoryChatMessages<'t> {
    state: &'t mut MemoryState,
    tx_id: u64,
}

pub struct MemoryOutbox<'t> {
    state: &'t mut MemoryState,
    tx_id: u64,
}

pub struct MemoryConversations<'t> {
    state: &'t mut MemoryState,
    tx_id: u64,
}

pub struct MemorySummaries<'t> {
    state: &'t mut MemoryState,
}

pub struct MemoryTodos<'t> {
    state: &'t mut MemoryState,
}

impl MemoryConversations<'_> {
    fn find_mut(&mut self, id: &Uuid) -> Option<&mut Conversation> {
        self.state
            .data
            .conversations
            .iter_mut()
            .find(|c| c.id == *id)
    }
}

impl MemoryOutbox<'_> {
    fn find_mut(&mut self, id: &Uuid) -> Result<&mut OutboxEvent, RepositoryError> {
        self.state
            .data
            .outbox
            .iter_mut()
            .find(|e| e.id == *id)
            .ok_or(RepositoryError::NotFound)
    }
}

fn chronological(messages: &mut [ChatMessage]) {
    // Stable sort keeps insertion order for equal timestamps.
    messages.sort_by_key(|m| m.created_at);
}

impl ChatMessageRepository for MemoryChatMessages<'_> {
    async fn create_chat_messages(&mut self, messages: &[ChatMessage]) -> Result<(), RepositoryError> {
        for message in messages {
            let attempt = self.state.message_insert_attempts;
            self.state.message_insert_attempts += 1;

            let rejected = self.state.faults.rejected_message_inserts.contains(&attempt);
            let duplicate = self.state.data.messages.iter().any(|m| m.id == message.id);
            if rejected || duplicate {
                self.state.record(
                    self.tx_id,
                    Operation::CreateChatMessageRejected {
                        message_id: message.id,
                    },
                );
                return Err(if duplicate {
                    RepositoryError::Conflict(format!("chat message {} already exists", message.id))
                } else {
                    RepositoryError::Query("injected message insert failure".to_string())
                });
            }

            self.state.data.messages.push(message.clone());
            self.state.record(
                self.tx_id,
                Operation::CreateChatMessage {
                    message_id: message.id,
                    turn_sequence: message.turn_sequence,
                },
            );
        }
        Ok(())
    }

    async fn list_recent(
        &mut self,
        conversation_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut messages: Vec<ChatMessage> = self
            .state
            .data
            .messages
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .cloned()
            .collect();
        chronological(&mut messages);
        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages.split_off(skip))
    }

    async fn list_by_conversation(
        &mut self,
        conversation_id: &Uuid,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut messages: Vec<ChatMessage> = self
            .state
            .data
            .messages
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .cloned()
            .collect();
        chronological(&mut messages);
        Ok(messages)
    }

    async fn list_by_turn(&mut self, turn_id: &Uuid) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut messages: Vec<ChatMessage> = self
            .state
            .data
            .messages
            .iter()
            .filter(|m| m.turn_id == *turn_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.turn_sequence);
        Ok(messages)
    }
}

impl ConversationRepository for MemoryConversations<'_> {
    async fn create(&mut self, conversation: &Conversation) -> Result<(), RepositoryError> {
        if self.find_mut(&conversation.id).is_some() {
            return Err(RepositoryError::Conflict(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }
        self.state.data.conversations.push(conversation.clone());
        self.state.record(
            self.tx_id,
            Operation::CreateConversation {
                conversation_id: conversation.id,
            },
        );
        Ok(())
    }

    async fn get(&mut self, id: &Uuid) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.find_mut(id).map(|c| c.clone()))
    }

    async fn touch(&mut self, id: &Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let conversation = self.find_mut(id).ok_or(RepositoryError::NotFound)?;
        conversation.last_message_at = Some(at);
        conversation.updated_at = at;
        self.state.record(
            self.tx_id,
            Operation::TouchConversation { conversation_id: *id },
        );
        Ok(())
    }

    async fn list(&mut self, limit: u32) -> Result<Vec<Conversation>, RepositoryError> {
        let mut conversations = self.state.data.conversations.clone();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        conversations.truncate(limit as usize);
        Ok(conversations)
    }
}

impl SummaryRepository for MemorySummaries<'_> {
    async fn get(&mut self, conversation_id: &Uuid) -> Result<Option<ConversationSummary>, RepositoryError> {
        Ok(self.state.data.summaries.get(conversation_id).cloned())
    }

    async fn upsert(&mut self, summary: &ConversationSummary) -> Result<(), RepositoryError> {
        self.state
            .data
            .summaries
            .insert(summary.conversation_id, summary.clone());
        Ok(())
    }
}

impl TodoRepository for MemoryTodos<'_> {
    async fn create(&mut self, todo: &Todo) -> Result<(), RepositoryError> {
        self.state.data.todos.push(todo.clone());
        Ok(())
    }

    async fn get(&mut self, id: &Uuid) -> Result<Option<Todo>, RepositoryError> {
        Ok(self.state.data.todos.iter().find(|t| t.id == *id).cloned())
    }

    async fn list(&mut self, filter: &TodoFilter) -> Result<Vec<Todo>, RepositoryError> {
        let limit = filter.limit.map_or(usize::MAX, |l| l as usize);
        Ok(self
            .state
            .data
            .todos
            .iter()
            .filter(|t| filter.completed.is_none_or(|c| t.completed == c))
            .take(limit)
            .cloned()
            .collect())
    }
}

impl OutboxRepository for MemoryOutbox<'_> {
    async fn enqueue(&mut self, event: &OutboxEvent) -> Result<(), RepositoryError> {
        self.state.data.outbox.push(event.clone());
        self.state.record(
            self.tx_id,
            Operation::EnqueueOutbox {
                chat_message_id: event.payload.chat_message_id,
            },
        );
        Ok(())
    }

    async fn claim_pending(&mut self, limit: u32) -> Result<Vec<OutboxEvent>, RepositoryError> {
        if self.state.faults.fail_outbox_claim {
            return Err(RepositoryError::Query("injected outbox claim failure".to_string()));
        }
        let mut claimed = Vec::new();
        for event in self
            .state
            .data
            .outbox
            .iter_mut()
            .filter(|e| e.status == OutboxStatus::Pending)
            .take(limit as usize)
        {
            event.status = OutboxStatus::Processing;
            claimed.push(event.clone());
        }
        Ok(claimed)
    }

    async fn mark_processed(&mut self, id: &Uuid) -> Result<(), RepositoryError> {
        self.find_mut(id)?.status = OutboxStatus::Processed;
        Ok(())
    }

    async fn mark_pending(&mut self, id: &Uuid, retry_count: u32, error: &str) -> Result<(), RepositoryError> {
        let event = self.find_mut(id)?;
        event.status = OutboxStatus::Pending;
        event.retry_count = retry_count;
        event.last_error = Some(error.to_string());
        Ok(())
    }

    async fn mark_failed(&mut self, id: &Uuid, retry_count: u32, error: &str) -> Result<(), RepositoryError> {
        let event = self.find_mut(id)?;
        event.status = OutboxStatus::Failed;
        event.retry_count = retry_count;
        event.last_error = Some(error.to_string());
        Ok(())
    }

    async fn delete(&mut self, id: &Uuid) -> Result<(), RepositoryError> {
        let before = self.state.data.outbox.len();
        self.state.data.outbox.retain(|e| e.id != *id);
        if self.state.data.outbox.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get(&mut self, id: &Uuid) -> Result<Option<OutboxEvent>, RepositoryError> {
        Ok(self.state.data.outbox.iter().find(|e| e.id == *id).cloned())
    }

    async fn list_by_status(
        &mut self,
        status: OutboxStatus,
        limit: u32,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        Ok(self
            .state
            .data
            .outbox
            .iter()
            .filter(|e| e.status == status)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn stats(&mut self) -> Result<OutboxStats, RepositoryError> {
        let mut stats = OutboxStats::default();
        for event in &self.state.data.outbox {
            match event.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Processing => stats.processing += 1,
                OutboxStatus::Processed => stats.processed += 1,
                OutboxStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todoloop_types::chat::MessageState;
    use todoloop_types::llm::MessageRole;

    fn message(conversation_id: Uuid, sequence: u32) -> ChatMessage {
        let now = Utc::now();
        ChatMessage {
            id: Uuid::now_v7(),
            conversation_id,
            turn_id: Uuid::now_v7(),
            turn_sequence: sequence,
            role: MessageRole::User,
            content: format!("message {sequence}"),
            state: MessageState::Completed,
            error: None,
            usage: None,
            action_call_id: None,
            action_calls: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let uow = InMemoryUnitOfWork::new();
        let conversation = Conversation::from_first_message("hi", 60, Utc::now());

        let mut tx = uow.begin().await.unwrap();
        tx.conversations().create(&conversation).await.unwrap();
        tx.chat_messages()
            .create_chat_messages(&[message(conversation.id, 0)])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(uow.messages().await.len(), 1);
        assert_eq!(uow.conversations().await.len(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let uow = InMemoryUnitOfWork::new();
        let conversation = Conversation::from_first_message("hi", 60, Utc::now());
        {
            let mut tx = uow.begin().await.unwrap();
            tx.conversations().create(&conversation).await.unwrap();
            tx.chat_messages()
                .create_chat_messages(&[message(conversation.id, 0)])
                .await
                .unwrap();
        }
        assert!(uow.messages().await.is_empty());
        assert!(uow.conversations().await.is_empty());

        let journal = uow.journal().await;
        assert_eq!(journal.last().map(|e| &e.op), Some(&Operation::Rollback));
    }

    #[tokio::test]
    async fn rejected_insert_is_journaled() {
        let uow = InMemoryUnitOfWork::new();
        uow.reject_message_insert(0).await;

        let mut tx = uow.begin().await.unwrap();
        let result = tx
            .chat_messages()
            .create_chat_messages(&[message(Uuid::now_v7(), 0)])
            .await;
        assert!(matches!(result, Err(RepositoryError::Query(_))));
        drop(tx);

        let ops: Vec<Operation> = uow.journal().await.into_iter().map(|e| e.op).collect();
        assert!(matches!(ops[1], Operation::CreateChatMessageRejected { .. }));
        assert_eq!(ops[2], Operation::Rollback);
    }

    #[tokio::test]
    async fn list_recent_returns_tail_oldest_first() {
        let uow = InMemoryUnitOfWork::new();
        let conversation_id = Uuid::now_v7();
        let mut tx = uow.begin().await.unwrap();
        for sequence in 0..5 {
            tx.chat_messages()
                .create_chat_messages(&[message(conversation_id, sequence)])
                .await
                .unwrap();
        }
        let recent = tx.chat_messages().list_recent(&conversation_id, 2).await.unwrap();
        let sequences: Vec<u32> = recent.iter().map(|m| m.turn_sequence).collect();
        assert_eq!(sequences, vec![3, 4]);
    }

    #[tokio::test]
    async fn touch_missing_conversation_is_not_found() {
        let uow = InMemoryUnitOfWork::new();
        let mut tx = uow.begin().await.unwrap();
        let result = tx.conversations().touch(&Uuid::now_v7(), Utc::now()).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }
}
