//! SQLite unit of work.
//!
//! Each transaction is a `sqlx::Transaction` on the writer pool; its single
//! connection serializes writers. Dropping a transaction without `commit`
//! rolls it back (sqlx issues the ROLLBACK when the connection returns to
//! the pool).

use sqlx::Sqlite;
use todoloop_core::repository::{Transaction, UnitOfWork};
use todoloop_types::error::RepositoryError;

use super::chat_message::SqliteChatMessages;
use super::conversation::SqliteConversations;
use super::db_error;
use super::outbox::SqliteOutbox;
use super::pool::DatabasePool;
use super::summary::SqliteSummaries;
use super::todo::SqliteTodos;

#[derive(Clone)]
pub struct SqliteUnitOfWork {
    pool: DatabasePool,
}

impl SqliteUnitOfWork {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// A transaction on the reader pool.
    ///
    /// Reader connections are opened read-only, so any write through it fails.
    /// Used for history and stats queries that must not queue behind writers.
    pub async fn begin_read(&self) -> Result<SqliteTransaction, RepositoryError> {
        let tx = self.pool.reader.begin().await.map_err(db_error)?;
        Ok(SqliteTransaction { tx })
    }
}

impl UnitOfWork for SqliteUnitOfWork {
    type Tx = SqliteTransaction;

    async fn begin(&self) -> Result<SqliteTransaction, RepositoryError> {
        let tx = self.pool.writer.begin().await.map_err(db_error)?;
        Ok(SqliteTransaction { tx })
    }
}

pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl Transaction for SqliteTransaction {
    type ChatMessages<'t> = SqliteChatMessages<'t>;
    type Outbox<'t> = SqliteOutbox<'t>;
    type Conversations<'t> = SqliteConversations<'t>;
    type Summaries<'t> = SqliteSummaries<'t>;
    type Todos<'t> = SqliteTodos<'t>;

    fn chat_messages(&mut self) -> SqliteChatMessages<'_> {
        SqliteChatMessages::new(&mut *self.tx)
    }

    fn outbox(&mut self) -> SqliteOutbox<'_> {
        SqliteOutbox::new(&mut *self.tx)
    }

    fn conversations(&mut self) -> SqliteConversations<'_> {
        SqliteConversations::new(&mut *self.tx)
    }

    fn summaries(&mut self) -> SqliteSummaries<'_> {
        SqliteSummaries::new(&mut *self.tx)
    }

    fn todos(&mut self) -> SqliteTodos<'_> {
        SqliteTodos::new(&mut *self.tx)
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx
            .commit()
            .await
            .map_err(|e| RepositoryError::Transaction(e.to_string()))
    }
}
