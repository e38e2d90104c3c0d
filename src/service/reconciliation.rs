use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::amount::bankers_round;
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::gateways::{to_minor_units, LedgerEntry, PaymentGateway};
use crate::repo::reconciliation_repo::{ReconciliationRepo, ReconciliationSummary};
use crate::repo::transactions_repo::TransactionsRepo;
use crate::service::alerts::AlertSink;

pub const RUN_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Discrepancy {
    pub transaction_id: Uuid,
    pub local_amount_minor: i64,
    pub remote_amount_minor: Option<i64>,
    pub delta_minor: i64,
    pub note: &'static str,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ClassifiedWindow {
    pub matched: i32,
    pub discrepancies: Vec<Discrepancy>,
    pub unmatched_local: Vec<Uuid>,
    pub unmatched_remote: Vec<String>,
}

fn expected_minor(txn: &Transaction) -> i64 {
    to_minor_units(bankers_round(txn.final_amount + txn.gst_amount, 2))
}

fn charged_locally(txn: &Transaction) -> bool {
    matches!(
        txn.status,
        TransactionStatus::Success | TransactionStatus::Refunded | TransactionStatus::PartialRefund
    )
}

/// Pure classification of a window. Deterministic over its inputs, so a re-run
/// against unchanged data yields identical counts.
pub fn classify_window(local: &[Transaction], remote: &[LedgerEntry]) -> ClassifiedWindow {
    let mut by_reference: HashMap<Uuid, &LedgerEntry> = HashMap::new();
    let mut by_gateway_id: HashMap<&str, &LedgerEntry> = HashMap::new();
    for entry in remote {
        if let Some(reference) = entry.reference {
            by_reference.insert(reference, entry);
        }
        by_gateway_id.insert(entry.gateway_transaction_id.as_str(), entry);
    }

    let mut consumed: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut out = ClassifiedWindow::default();

    for txn in local {
        let entry = by_reference.get(&txn.transaction_id).copied().or_else(|| {
            txn.gateway_transaction_id
                .as_deref()
                .and_then(|id| by_gateway_id.get(id).copied())
        });

        match entry {
            None => {
                if charged_locally(txn) {
                    // We believe we were paid; the provider has no record.
                    out.unmatched_local.push(txn.transaction_id);
                } else {
                    // Nothing on either side: a failed attempt that never
                    // captured is consistent.
                    out.matched += 1;
                }
            }
            Some(entry) => {
                consumed.insert(entry.gateway_transaction_id.as_str());
                let expected = expected_minor(txn);
                if entry.captured && charged_locally(txn) {
                    if entry.amount_minor == expected {
                        out.matched += 1;
                    } else {
                        out.discrepancies.push(Discrepancy {
                            transaction_id: txn.transaction_id,
                            local_amount_minor: expected,
                            remote_amount_minor: Some(entry.amount_minor),
                            delta_minor: entry.amount_minor - expected,
                            note: "amount mismatch",
                        });
                    }
                } else if entry.captured && !charged_locally(txn) {
                    out.discrepancies.push(Discrepancy {
                        transaction_id: txn.transaction_id,
                        local_amount_minor: expected,
                        remote_amount_minor: Some(entry.amount_minor),
                        delta_minor: entry.amount_minor,
                        note: "captured remotely but not settled locally",
                    });
                } else if !entry.captured && charged_locally(txn) {
                    out.discrepancies.push(Discrepancy {
                        transaction_id: txn.transaction_id,
                        local_amount_minor: expected,
                        remote_amount_minor: Some(entry.amount_minor),
                        delta_minor: -expected,
                        note: "settled locally but not captured remotely",
                    });
                } else {
                    out.matched += 1;
                }
            }
        }
    }

    for entry in remote {
        if entry.captured && !consumed.contains(entry.gateway_transaction_id.as_str()) {
            out.unmatched_remote.push(entry.gateway_transaction_id.clone());
        }
    }

    out
}

/// Previous-calendar-day UTC window.
pub fn previous_day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();
    (end - Duration::days(1), end)
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    pub transactions_repo: TransactionsRepo,
    pub reconciliation_repo: ReconciliationRepo,
    pub gateway: Arc<dyn PaymentGateway>,
    pub alerts: Arc<dyn AlertSink>,
    pub report_recipients: Vec<String>,
    running: Arc<AtomicBool>,
}

impl ReconciliationEngine {
    pub fn new(
        transactions_repo: TransactionsRepo,
        reconciliation_repo: ReconciliationRepo,
        gateway: Arc<dyn PaymentGateway>,
        alerts: Arc<dyn AlertSink>,
        report_recipients: Vec<String>,
    ) -> Self {
        Self {
            transactions_repo,
            reconciliation_repo,
            gateway,
            alerts,
            report_recipients,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(self) {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(RUN_INTERVAL_SECS)).await;
            let (start, end) = previous_day_window(Utc::now());
            if let Err(err) = self.tick(start, end).await {
                tracing::error!("reconciliation run failed: {err:#}");
            }
        }
    }

    pub async fn tick(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("reconciliation already running, skipping");
            return Ok(());
        }
        let result = self.reconcile_window(start, end).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    pub async fn reconcile_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        let local = self.transactions_repo.list_in_window(start, end).await?;
        let remote = self.gateway.fetch_ledger(start, end).await?;
        let classified = classify_window(&local, &remote);

        let summary = ReconciliationSummary {
            window_start: start,
            window_end: end,
            matched: classified.matched,
            discrepancies: classified.discrepancies.len() as i32,
            unmatched_local: classified.unmatched_local.len() as i32,
            unmatched_remote: classified.unmatched_remote.len() as i32,
        };
        self.reconciliation_repo
            .upsert(&summary, &serde_json::to_value(&classified)?)
            .await?;

        if self.report_recipients.is_empty() {
            tracing::warn!("no reconciliation report recipients configured");
        } else if let Err(err) = self
            .alerts
            .send(
                "reconciliation_report",
                serde_json::json!({
                    "recipients": self.report_recipients,
                    "summary": summary,
                }),
            )
            .await
        {
            tracing::error!("failed to dispatch reconciliation report: {err:#}");
        }

        tracing::info!(
            matched = summary.matched,
            discrepancies = summary.discrepancies,
            unmatched_local = summary.unmatched_local,
            unmatched_remote = summary.unmatched_remote,
            "reconciliation window complete"
        );
        Ok(())
    }
}
