//! SQLite chat message repository.
//!
//! Messages are append-only. Ordering within a conversation is
//! `created_at` then `rowid`, so messages created within the same
//! microsecond keep their insertion order.

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use todoloop_core::repository::ChatMessageRepository;
use todoloop_types::chat::{ActionCall, ChatMessage, MessageRole, MessageState, TokenUsage};
use todoloop_types::error::RepositoryError;
use uuid::Uuid;

use super::{db_error, format_datetime, parse_datetime, parse_uuid};

const COLUMNS: &str = "id, conversation_id, turn_id, turn_sequence, role, content, state, error, \
     prompt_tokens, completion_tokens, total_tokens, action_call_id, action_calls, created_at, updated_at";

pub struct SqliteChatMessages<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> SqliteChatMessages<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatMessageRow {
    id: String,
    conversation_id: String,
    turn_id: String,
    turn_sequence: i64,
    role: String,
    content: String,
    state: String,
    error: Option<String>,
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
    total_tokens: Option<i64>,
    action_call_id: Option<String>,
    action_calls: String,
    created_at: String,
    updated_at: String,
}

impl ChatMessageRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            turn_id: row.try_get("turn_id")?,
            turn_sequence: row.try_get("turn_sequence")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            state: row.try_get("state")?,
            error: row.try_get("error")?,
            prompt_tokens: row.try_get("prompt_tokens")?,
            completion_tokens: row.try_get("completion_tokens")?,
            total_tokens: row.try_get("total_tokens")?,
            action_call_id: row.try_get("action_call_id")?,
            action_calls: row.try_get("action_calls")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let role: MessageRole = self.role.parse().map_err(RepositoryError::Query)?;
        let state: MessageState = self.state.parse().map_err(RepositoryError::Query)?;
        let action_calls: Vec<ActionCall> = serde_json::from_str(&self.action_calls)
            .map_err(|e| RepositoryError::Query(format!("invalid action_calls: {e}")))?;
        let usage = match (self.prompt_tokens, self.completion_tokens, self.total_tokens) {
            (Some(prompt), Some(completion), Some(total)) => Some(TokenUsage {
                prompt_tokens: prompt as u32,
                completion_tokens: completion as u32,
                total_tokens: total as u32,
            }),
            _ => None,
        };

        Ok(ChatMessage {
            id: parse_uuid(&self.id, "message id")?,
            conversation_id: parse_uuid(&self.conversation_id, "conversation_id")?,
            turn_id: parse_uuid(&self.turn_id, "turn_id")?,
            turn_sequence: self.turn_sequence as u32,
            role,
            content: self.content,
            state,
            error: self.error,
            usage,
            action_call_id: self.action_call_id,
            action_calls,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn into_messages(rows: Vec<SqliteRow>) -> Result<Vec<ChatMessage>, RepositoryError> {
    rows.iter()
        .map(|row| {
            ChatMessageRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_message()
        })
        .collect()
}

impl ChatMessageRepository for SqliteChatMessages<'_> {
    async fn create_chat_messages(&mut self, messages: &[ChatMessage]) -> Result<(), RepositoryError> {
        for message in messages {
            let action_calls = serde_json::to_string(&message.action_calls)
                .map_err(|e| RepositoryError::Query(format!("failed to encode action_calls: {e}")))?;

            sqlx::query(
                r#"INSERT INTO chat_messages
                   (id, conversation_id, turn_id, turn_sequence, role, content, state, error,
                    prompt_tokens, completion_tokens, total_tokens, action_call_id, action_calls,
                    created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(message.id.to_string())
            .bind(message.conversation_id.to_string())
            .bind(message.turn_id.to_string())
            .bind(i64::from(message.turn_sequence))
            .bind(message.role.to_string())
            .bind(&message.content)
            .bind(message.state.to_string())
            .bind(&message.error)
            .bind(message.usage.map(|u| i64::from(u.prompt_tokens)))
            .bind(message.usage.map(|u| i64::from(u.completion_tokens)))
            .bind(message.usage.map(|u| i64::from(u.total_tokens)))
            .bind(&message.action_call_id)
            .bind(action_calls)
            .bind(format_datetime(&message.created_at))
            .bind(format_datetime(&message.updated_at))
            .execute(&mut *self.conn)
            .await
            .map_err(db_error)?;
        }
        Ok(())
    }

    async fn list_recent(
        &mut self,
        conversation_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM (
                 SELECT {COLUMNS}, rowid AS seq FROM chat_messages
                 WHERE conversation_id = ?
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?
             )
             ORDER BY created_at ASC, seq ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(conversation_id.to_string())
            .bind(i64::from(limit))
            .fetch_all(&mut *self.conn)
            .await
            .map_err(db_error)?;

        into_messages(rows)
    }

    async fn list_by_conversation(
        &mut self,
        conversation_id: &Uuid,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM chat_messages WHERE conversation_id = ? ORDER BY created_at ASC, rowid ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(conversation_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(db_error)?;

        into_messages(rows)
    }

    async fn list_by_turn(&mut self, turn_id: &Uuid) -> Result<Vec<ChatMessage>, RepositoryError> {
        let sql = format!("SELECT {COLUMNS} FROM chat_messages WHERE turn_id = ? ORDER BY turn_sequence ASC");
        let rows = sqlx::query(&sql)
            .bind(turn_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(db_error)?;

        into_messages(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::testing::temp_pool;
    use crate::sqlite::SqliteUnitOfWork;
    use chrono::{DateTime, Duration, SubsecRound, Utc};
    use serde_json::json;
    use todoloop_core::repository::{ConversationRepository, Transaction, UnitOfWork};
    use todoloop_types::chat::Conversation;

    fn message(conversation_id: Uuid, turn_id: Uuid, sequence: u32, at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: Uuid::now_v7(),
            conversation_id,
            turn_id,
            turn_sequence: sequence,
            role: MessageRole::User,
            content: format!("message {sequence}"),
            state: MessageState::Completed,
            error: None,
            usage: None,
            action_call_id: None,
            action_calls: vec![],
            created_at: at,
            updated_at: at,
        }
    }

    async fn setup() -> (tempfile::TempDir, SqliteUnitOfWork, Conversation) {
        let (dir, pool) = temp_pool().await;
        let uow = SqliteUnitOfWork::new(pool);
        let conversation = Conversation::from_first_message("hi", 60, Utc::now());
        let mut tx = uow.begin().await.unwrap();
        tx.conversations().create(&conversation).await.unwrap();
        tx.commit().await.unwrap();
        (dir, uow, conversation)
    }

    #[tokio::test]
    async fn roundtrips_usage_and_action_calls() {
        let (_dir, uow, conversation) = setup().await;
        let mut assistant = message(conversation.id, Uuid::now_v7(), 1, Utc::now());
        assistant.role = MessageRole::Assistant;
        assistant.usage = Some(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 4,
            total_tokens: 14,
        });
        assistant.action_calls = vec![ActionCall {
            id: "call-1".to_string(),
            name: "list_todos".to_string(),
            input: json!({"limit": 5}),
        }];

        let mut tx = uow.begin().await.unwrap();
        tx.chat_messages()
            .create_chat_messages(std::slice::from_ref(&assistant))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = uow.begin_read().await.unwrap();
        let stored = tx.chat_messages().list_by_turn(&assistant.turn_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].usage, assistant.usage);
        assert_eq!(stored[0].action_calls, assistant.action_calls);
        assert_eq!(stored[0].created_at, assistant.created_at.trunc_subsecs(6));
    }

    #[tokio::test]
    async fn list_recent_returns_latest_window_oldest_first() {
        let (_dir, uow, conversation) = setup().await;
        let turn = Uuid::now_v7();
        let start = Utc::now();
        let messages: Vec<ChatMessage> = (0..5)
            .map(|i| message(conversation.id, turn, i, start + Duration::seconds(i64::from(i))))
            .collect();

        let mut tx = uow.begin().await.unwrap();
        tx.chat_messages().create_chat_messages(&messages).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = uow.begin_read().await.unwrap();
        let recent = tx.chat_messages().list_recent(&conversation.id, 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);

        let all = tx.chat_messages().list_by_conversation(&conversation.id).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn equal_timestamps_keep_insertion_order() {
        let (_dir, uow, conversation) = setup().await;
        let turn = Uuid::now_v7();
        let at = Utc::now();
        let messages: Vec<ChatMessage> = (0..3).map(|i| message(conversation.id, turn, i, at)).collect();

        let mut tx = uow.begin().await.unwrap();
        tx.chat_messages().create_chat_messages(&messages).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = uow.begin_read().await.unwrap();
        let stored = tx.chat_messages().list_by_conversation(&conversation.id).await.unwrap();
        let ids: Vec<Uuid> = stored.iter().map(|m| m.id).collect();
        assert_eq!(ids, messages.iter().map(|m| m.id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn duplicate_sequence_in_turn_is_a_conflict() {
        let (_dir, uow, conversation) = setup().await;
        let turn = Uuid::now_v7();

        let mut tx = uow.begin().await.unwrap();
        tx.chat_messages()
            .create_chat_messages(&[message(conversation.id, turn, 0, Utc::now())])
            .await
            .unwrap();
        let err = tx
            .chat_messages()
            .create_chat_messages(&[message(conversation.id, turn, 0, Utc::now())])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_conversation_is_rejected() {
        let (_dir, uow, _conversation) = setup().await;
        let mut tx = uow.begin().await.unwrap();
        let result = tx
            .chat_messages()
            .create_chat_messages(&[message(Uuid::now_v7(), Uuid::now_v7(), 0, Utc::now())])
            .await;
        assert!(result.is_err());
    }
}
