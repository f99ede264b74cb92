//! SQLite conversation summary repository (one summary per conversation).

use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use todoloop_core::repository::SummaryRepository;
use todoloop_types::chat::ConversationSummary;
use todoloop_types::error::RepositoryError;
use uuid::Uuid;

use super::{db_error, format_datetime, parse_datetime};

pub struct SqliteSummaries<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> SqliteSummaries<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }
}

impl SummaryRepository for SqliteSummaries<'_> {
    async fn get(&mut self, conversation_id: &Uuid) -> Result<Option<ConversationSummary>, RepositoryError> {
        let row = sqlx::query("SELECT summary, updated_at FROM conversation_summaries WHERE conversation_id = ?")
            .bind(conversation_id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let summary: String = row.try_get("summary").map_err(db_error)?;
        let updated_at: String = row.try_get("updated_at").map_err(db_error)?;
        Ok(Some(ConversationSummary {
            conversation_id: *conversation_id,
            summary,
            updated_at: parse_datetime(&updated_at)?,
        }))
    }

    async fn upsert(&mut self, summary: &ConversationSummary) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO conversation_summaries (conversation_id, summary, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(conversation_id) DO UPDATE SET
                   summary = excluded.summary,
                   updated_at = excluded.updated_at"#,
        )
        .bind(summary.conversation_id.to_string())
        .bind(&summary.summary)
        .bind(format_datetime(&summary.updated_at))
        .execute(&mut *self.conn)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}
