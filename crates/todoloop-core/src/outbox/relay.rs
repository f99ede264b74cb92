//! Outbox relay.
//!
//! One pass (`execute`) runs in a single transaction: claim up to
//! `batch_size` pending records, publish each, then resolve every claimed
//! record before committing:
//!
//! - published: `processed`, or deleted under the delete retention policy;
//! - publish failed: retry count + 1, then `failed` once it reaches the
//!   record's `max_retries`, otherwise back to `pending` with the error.
//!
//! A failed publish never aborts the pass; only storage errors do, in which
//! case the transaction rolls back and every claim is released.

use todoloop_types::config::{OutboxConfig, RetentionPolicy};
use todoloop_types::error::{PublishError, RepositoryError};
use todoloop_types::outbox::DomainEvent;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::repository::{OutboxRepository, Transaction, UnitOfWork};

/// Destination of relayed events.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &DomainEvent) -> impl std::future::Future<Output = Result<(), PublishError>> + Send;
}

/// Counts for one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub claimed: usize,
    pub published: usize,
    /// Failed publishes returned to `pending`.
    pub retried: usize,
    /// Failed publishes that exhausted their retries.
    pub failed: usize,
}

pub struct OutboxRelay<U, P> {
    uow: U,
    publisher: P,
    config: OutboxConfig,
}

impl<U: UnitOfWork, P: EventPublisher> OutboxRelay<U, P> {
    pub fn new(uow: U, publisher: P, config: OutboxConfig) -> Self {
        Self {
            uow,
            publisher,
            config,
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Run one relay pass.
    pub async fn execute(&self) -> Result<RelayReport, RepositoryError> {
        let span = info_span!("outbox_relay_pass", batch_size = self.config.batch_size);
        self.pass().instrument(span).await
    }

    async fn pass(&self) -> Result<RelayReport, RepositoryError> {
        let mut tx = self.uow.begin().await?;
        let batch = tx.outbox().claim_pending(self.config.batch_size.max(1)).await?;
        let mut report = RelayReport {
            claimed: batch.len(),
            ..Default::default()
        };

        for record in batch {
            match self.publisher.publish(&record.to_domain_event()).await {
                Ok(()) => {
                    match self.config.retention {
                        RetentionPolicy::MarkProcessed => tx.outbox().mark_processed(&record.id).await?,
                        RetentionPolicy::Delete => tx.outbox().delete(&record.id).await?,
                    }
                    report.published += 1;
                }
                Err(publish_error) => {
                    let retry_count = record.retry_count + 1;
                    let message = publish_error.to_string();
                    if retry_count >= record.max_retries {
                        warn!(
                            outbox_id = %record.id,
                            retry_count,
                            error = %message,
                            "outbox event exhausted its retries"
                        );
                        tx.outbox().mark_failed(&record.id, retry_count, &message).await?;
                        report.failed += 1;
                    } else {
                        warn!(
                            outbox_id = %record.id,
                            retry_count,
                            error = %message,
                            "outbox publish failed, will retry"
                        );
                        tx.outbox().mark_pending(&record.id, retry_count, &message).await?;
                        report.retried += 1;
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(report)
    }

    /// Repeat `execute` every poll interval until cancelled.
    ///
    /// Pass errors are logged; the loop keeps going.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.config.poll_interval_ms,
            retention = %self.config.retention,
            "outbox relay started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            match self.execute().await {
                Ok(report) if report.claimed > 0 => info!(
                    claimed = report.claimed,
                    published = report.published,
                    retried = report.retried,
                    failed = report.failed,
                    "outbox relay pass"
                ),
                Ok(_) => debug!("outbox empty"),
                Err(e) => error!(error = %e, "outbox relay pass failed"),
            }
        }
        info!("outbox relay stopped");
    }
}
