use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::session::SessionStatus;
use crate::domain::transaction::TransactionStatus;
use crate::error::PaymentError;
use crate::repo::sessions_repo::SessionsRepo;
use crate::repo::transactions_repo::TransactionsRepo;
use crate::service::retry::{with_cas_retry, CasAttempt, RetryPolicy};

pub const SWEEP_INTERVAL_SECS: u64 = 3600;
const SWEEP_BATCH: i64 = 500;
const PURGE_AFTER_HOURS: i64 = 24;

/// Hourly sweep that closes payment attempts nobody ever confirmed: the
/// session goes EXPIRED and its still-pending transaction is finalized as
/// EXPIRED with error category `expired`, so no attempt stays open forever.
#[derive(Clone)]
pub struct SessionSweeper {
    pub sessions_repo: SessionsRepo,
    pub transactions_repo: TransactionsRepo,
    pub retry_policy: RetryPolicy,
    running: Arc<AtomicBool>,
}

impl SessionSweeper {
    pub fn new(
        sessions_repo: SessionsRepo,
        transactions_repo: TransactionsRepo,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            sessions_repo,
            transactions_repo,
            retry_policy,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(self) {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS)).await;
            if let Err(err) = self.tick().await {
                tracing::error!("session sweep failed: {err:#}");
            }
        }
    }

    pub async fn tick(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("session sweep already running, skipping");
            return Ok(());
        }
        let result = self.sweep().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn sweep(&self) -> Result<()> {
        let now = Utc::now();
        let overdue = self.sessions_repo.overdue_active(now, SWEEP_BATCH).await?;
        let mut expired = 0usize;

        for session in overdue {
            self.sessions_repo
                .mark_terminal(&session.session_id, SessionStatus::Expired)
                .await?;

            match self.expire_transaction(session.transaction_id).await {
                Ok(()) => expired += 1,
                // A notification landed between the query and the CAS; the
                // transaction settled on its own and the sweep moves on.
                Err(PaymentError::Conflict) => {}
                Err(err) => {
                    tracing::error!(
                        transaction_id = %session.transaction_id,
                        "failed to expire transaction: {err:#}"
                    );
                }
            }
        }

        let purged = self
            .sessions_repo
            .purge_older_than(now - Duration::hours(PURGE_AFTER_HOURS))
            .await?;

        tracing::info!(expired, purged, "session sweep complete");
        Ok(())
    }

    async fn expire_transaction(&self, transaction_id: uuid::Uuid) -> Result<(), PaymentError> {
        with_cas_retry(self.retry_policy, || async move {
            let Some(txn) = self.transactions_repo.get(transaction_id).await? else {
                return Ok(CasAttempt::Applied(()));
            };
            if txn.status != TransactionStatus::Pending {
                return Ok(CasAttempt::Applied(()));
            }

            let applied = self
                .transactions_repo
                .cas_mark_failed(
                    transaction_id,
                    txn.version,
                    TransactionStatus::Expired,
                    None,
                    "expired",
                    "payment window elapsed without gateway confirmation",
                )
                .await?;

            Ok(if applied {
                CasAttempt::Applied(())
            } else {
                CasAttempt::Conflict
            })
        })
        .await
    }
}
