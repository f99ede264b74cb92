//! SQLite storage layer.
//!
//! A [`SqliteUnitOfWork`] hands out transactions on the single writer
//! connection; the repository implementations borrow the transaction's
//! connection, so every write of a transaction commits or rolls back together.

pub mod chat_message;
pub mod conversation;
pub mod outbox;
pub mod pool;
pub mod summary;
pub mod todo;
pub mod unit_of_work;

pub use pool::DatabasePool;
pub use unit_of_work::{SqliteTransaction, SqliteUnitOfWork};

use chrono::{DateTime, SecondsFormat, Utc};
use todoloop_types::error::RepositoryError;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers shared by the repository implementations
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 so that TEXT ordering is chronological.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn parse_uuid(s: &str, field: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Query(format!("invalid {field}: {e}")))
}

/// Map a sqlx error, surfacing unique violations as conflicts.
pub(crate) fn db_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => RepositoryError::Connection,
        _ => RepositoryError::Query(err.to_string()),
    }
}
