//! SQLite outbox repository.
//!
//! `claim_pending` flips the selected rows to `processing` in the same
//! statement that reads them, so a second relay transaction cannot pick the
//! same rows. Claimed rows are only ever visible as `processing` inside the
//! claiming transaction; the relay resolves them before it commits, and a
//! rollback returns them to `pending`.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use todoloop_core::repository::OutboxRepository;
use todoloop_types::error::RepositoryError;
use todoloop_types::outbox::{OutboxEvent, OutboxEventType, OutboxPayload, OutboxStats, OutboxStatus};
use uuid::Uuid;

use super::{db_error, format_datetime, parse_datetime, parse_uuid};

const COLUMNS: &str = "id, event_type, payload, status, retry_count, max_retries, last_error, created_at";

pub struct SqliteOutbox<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> SqliteOutbox<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    async fn set_status(
        &mut self,
        id: &Uuid,
        status: OutboxStatus,
        retry: Option<(u32, &str)>,
    ) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let result = match retry {
            Some((retry_count, error)) => {
                sqlx::query(
                    "UPDATE outbox_events SET status = ?, retry_count = ?, last_error = ?, updated_at = ? WHERE id = ?",
                )
                .bind(status.to_string())
                .bind(i64::from(retry_count))
                .bind(error)
                .bind(&now)
                .bind(id.to_string())
                .execute(&mut *self.conn)
                .await
            }
            None => {
                sqlx::query("UPDATE outbox_events SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(status.to_string())
                    .bind(&now)
                    .bind(id.to_string())
                    .execute(&mut *self.conn)
                    .await
            }
        }
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

struct OutboxRow {
    id: String,
    event_type: String,
    payload: String,
    status: String,
    retry_count: i64,
    max_retries: i64,
    last_error: Option<String>,
    created_at: String,
}

impl OutboxRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            status: row.try_get("status")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_event(self) -> Result<OutboxEvent, RepositoryError> {
        let event_type: OutboxEventType = self.event_type.parse().map_err(RepositoryError::Query)?;
        let status: OutboxStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let payload: OutboxPayload = serde_json::from_str(&self.payload)
            .map_err(|e| RepositoryError::Query(format!("invalid outbox payload: {e}")))?;

        Ok(OutboxEvent {
            id: parse_uuid(&self.id, "outbox id")?,
            event_type,
            payload,
            status,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            last_error: self.last_error,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn into_event(row: &SqliteRow) -> Result<OutboxEvent, RepositoryError> {
    OutboxRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_event()
}

impl OutboxRepository for SqliteOutbox<'_> {
    async fn enqueue(&mut self, event: &OutboxEvent) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(&event.payload)
            .map_err(|e| RepositoryError::Query(format!("failed to encode outbox payload: {e}")))?;
        let created_at = format_datetime(&event.created_at);

        sqlx::query(
            r#"INSERT INTO outbox_events
               (id, event_type, payload, status, retry_count, max_retries, last_error, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(event.event_type.to_string())
        .bind(payload)
        .bind(event.status.to_string())
        .bind(i64::from(event.retry_count))
        .bind(i64::from(event.max_retries))
        .bind(&event.last_error)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&mut *self.conn)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn claim_pending(&mut self, limit: u32) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let sql = format!(
            "UPDATE outbox_events SET status = 'processing', updated_at = ?
             WHERE id IN (
                 SELECT id FROM outbox_events
                 WHERE status = 'pending'
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?
             )
             RETURNING {COLUMNS}"
        );
        let rows = sqlx::query(&sql)
            .bind(format_datetime(&Utc::now()))
            .bind(i64::from(limit))
            .fetch_all(&mut *self.conn)
            .await
            .map_err(db_error)?;

        // RETURNING does not guarantee order.
        let mut claimed = rows.iter().map(into_event).collect::<Result<Vec<_>, _>>()?;
        claimed.sort_by_key(|e| (e.created_at, e.id));
        Ok(claimed)
    }

    async fn mark_processed(&mut self, id: &Uuid) -> Result<(), RepositoryError> {
        self.set_status(id, OutboxStatus::Processed, None).await
    }

    async fn mark_pending(&mut self, id: &Uuid, retry_count: u32, error: &str) -> Result<(), RepositoryError> {
        self.set_status(id, OutboxStatus::Pending, Some((retry_count, error)))
            .await
    }

    async fn mark_failed(&mut self, id: &Uuid, retry_count: u32, error: &str) -> Result<(), RepositoryError> {
        self.set_status(id, OutboxStatus::Failed, Some((retry_count, error)))
            .await
    }

    async fn delete(&mut self, id: &Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM outbox_events WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get(&mut self, id: &Uuid) -> Result<Option<OutboxEvent>, RepositoryError> {
        let sql = format!("SELECT {COLUMNS} FROM outbox_events WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(db_error)?;

        row.as_ref().map(into_event).transpose()
    }

    async fn list_by_status(
        &mut self,
        status: OutboxStatus,
        limit: u32,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM outbox_events WHERE status = ? ORDER BY created_at ASC, rowid ASC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(status.to_string())
            .bind(i64::from(limit))
            .fetch_all(&mut *self.conn)
            .await
            .map_err(db_error)?;

        rows.iter().map(into_event).collect()
    }

    async fn stats(&mut self) -> Result<OutboxStats, RepositoryError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM outbox_events GROUP BY status")
                .fetch_all(&mut *self.conn)
                .await
                .map_err(db_error)?;

        let mut stats = OutboxStats::default();
        for (status, count) in rows {
            let count = count as u64;
            match status.parse::<OutboxStatus>().map_err(RepositoryError::Query)? {
                OutboxStatus::Pending => stats.pending = count,
                OutboxStatus::Processing => stats.processing = count,
                OutboxStatus::Processed => stats.processed = count,
                OutboxStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }
}
