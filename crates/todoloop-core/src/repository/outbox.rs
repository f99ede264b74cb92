//! Outbox repository trait definition.
//!
//! Records are enqueued by the turn writer and resolved by the relay. All
//! status transitions happen inside the relay's transaction.

use todoloop_types::error::RepositoryError;
use todoloop_types::outbox::{OutboxEvent, OutboxStats, OutboxStatus};
use uuid::Uuid;

pub trait OutboxRepository: Send {
    /// Insert a new `pending` record.
    fn enqueue(
        &mut self,
        event: &OutboxEvent,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Fetch up to `limit` pending records, oldest first, and move them to
    /// `processing` in the same statement.
    ///
    /// Claimed records are returned with their new status.
    fn claim_pending(
        &mut self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<OutboxEvent>, RepositoryError>> + Send;

    fn mark_processed(
        &mut self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Return a record to `pending` after a failed publish.
    fn mark_pending(
        &mut self,
        id: &Uuid,
        retry_count: u32,
        error: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Terminal failure: the record is never claimed again.
    fn mark_failed(
        &mut self,
        id: &Uuid,
        retry_count: u32,
        error: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn delete(
        &mut self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &mut self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<OutboxEvent>, RepositoryError>> + Send;

    /// Records in a given status, oldest first.
    fn list_by_status(
        &mut self,
        status: OutboxStatus,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<OutboxEvent>, RepositoryError>> + Send;

    fn stats(
        &mut self,
    ) -> impl std::future::Future<Output = Result<OutboxStats, RepositoryError>> + Send;
}
