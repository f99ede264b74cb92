//! SQLite conversation repository.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use todoloop_core::repository::ConversationRepository;
use todoloop_types::chat::{Conversation, TitleSource};
use todoloop_types::error::RepositoryError;
use uuid::Uuid;

use super::{db_error, format_datetime, parse_datetime, parse_uuid};

pub struct SqliteConversations<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> SqliteConversations<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }
}

struct ConversationRow {
    id: String,
    title: String,
    title_source: String,
    created_at: String,
    updated_at: String,
    last_message_at: Option<String>,
}

impl ConversationRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            title_source: row.try_get("title_source")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            last_message_at: row.try_get("last_message_at")?,
        })
    }

    fn into_conversation(self) -> Result<Conversation, RepositoryError> {
        let title_source: TitleSource = self.title_source.parse().map_err(RepositoryError::Query)?;
        Ok(Conversation {
            id: parse_uuid(&self.id, "conversation id")?,
            title: self.title,
            title_source,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            last_message_at: self.last_message_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

fn into_conversation(row: &SqliteRow) -> Result<Conversation, RepositoryError> {
    ConversationRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_conversation()
}

impl ConversationRepository for SqliteConversations<'_> {
    async fn create(&mut self, conversation: &Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO conversations (id, title, title_source, created_at, updated_at, last_message_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(conversation.id.to_string())
        .bind(&conversation.title)
        .bind(conversation.title_source.to_string())
        .bind(format_datetime(&conversation.created_at))
        .bind(format_datetime(&conversation.updated_at))
        .bind(conversation.last_message_at.as_ref().map(format_datetime))
        .execute(&mut *self.conn)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn get(&mut self, id: &Uuid) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, title, title_source, created_at, updated_at, last_message_at FROM conversations WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(db_error)?;

        row.as_ref().map(into_conversation).transpose()
    }

    async fn touch(&mut self, id: &Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let stamp = format_datetime(&at);
        let result = sqlx::query("UPDATE conversations SET last_message_at = ?, updated_at = ? WHERE id = ?")
            .bind(&stamp)
            .bind(&stamp)
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list(&mut self, limit: u32) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT id, title, title_source, created_at, updated_at, last_message_at
               FROM conversations
               ORDER BY updated_at DESC
               LIMIT ?"#,
        )
        .bind(i64::from(limit))
        .fetch_all(&mut *self.conn)
        .await
        .map_err(db_error)?;

        rows.iter().map(into_conversation).collect()
    }
}
