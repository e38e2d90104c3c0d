use anyhow::Context;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::amount::amounts_agree;
use crate::domain::notification::{
    reconcile, NotificationSource, ReconcileDecision, ReportedOutcome,
};
use crate::domain::transaction::{categorize_gateway_error, Transaction, TransactionStatus};
use crate::error::{not_found, validation, PaymentError};
use crate::gateways::{from_minor_units, PaymentGateway, RemoteStatus};
use crate::repo::catalog_repo::CatalogRepo;
use crate::repo::enrollments_repo::EnrollmentsRepo;
use crate::repo::notification_log_repo::NotificationLogRepo;
use crate::repo::transactions_repo::TransactionsRepo;
use crate::service::retry::{with_cas_retry, CasAttempt, RetryPolicy};
use crate::service::security_log::SecurityLog;
use crate::service::sessions::SessionManager;
use crate::service::side_effects::{SideEffect, SideEffectQueue};

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub transaction_id: Uuid,
    pub gateway_payment_id: String,
    #[serde(default)]
    pub amount_minor: Option<i64>,
    #[serde(default)]
    pub error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub transaction_id: Uuid,
    pub status: String,
    pub gateway_transaction_id: Option<String>,
}

struct VerifiedEvent {
    outcome: ReportedOutcome,
    gateway_payment_id: String,
    error_code: Option<String>,
}

/// Applies both notification channels under optimistic concurrency.
#[derive(Clone)]
pub struct NotificationProcessor {
    pub pool: PgPool,
    pub transactions_repo: TransactionsRepo,
    pub sessions: SessionManager,
    pub notification_log: NotificationLogRepo,
    pub catalog: CatalogRepo,
    pub enrollments: EnrollmentsRepo,
    pub gateway: Arc<dyn PaymentGateway>,
    pub security_log: SecurityLog,
    pub side_effects: SideEffectQueue,
    pub retry_policy: RetryPolicy,
}

impl NotificationProcessor {
    /// Authoritative channel; CAS exhaustion maps to a retryable 503.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<TransactionStatus, PaymentError> {
        if !self.gateway.verify_webhook_signature(raw_body, signature) {
            let detail = serde_json::json!({
                "reason": "webhook signature mismatch",
                "body_len": raw_body.len(),
            });
            if let Err(err) = self.security_log.record("webhook_signature_invalid", detail).await {
                tracing::error!("failed to persist security event: {err:#}");
            }
            return Err(PaymentError::SignatureInvalid);
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| validation(format!("malformed webhook payload: {e}")))?;
        let outcome = match envelope.event.as_str() {
            "payment.captured" => ReportedOutcome::Success,
            "payment.failed" => ReportedOutcome::Failed,
            other => return Err(validation(format!("unsupported webhook event {other}"))),
        };

        let payload_json =
            serde_json::from_slice(raw_body).unwrap_or_else(|_| serde_json::Value::Null);
        let event = VerifiedEvent {
            outcome,
            gateway_payment_id: envelope.payload.gateway_payment_id.clone(),
            error_code: envelope.payload.error_code.clone(),
        };

        // Independent re-validation of the gateway-reported amount. Drift is
        // recorded and alerted, not silently accepted.
        if let Some(amount_minor) = envelope.payload.amount_minor {
            self.flag_amount_drift(envelope.payload.transaction_id, amount_minor)
                .await;
        }

        self.apply(
            envelope.payload.transaction_id,
            NotificationSource::Authoritative,
            event,
            payload_json,
            Some(true),
        )
        .await
    }

    /// Advisory channel; the claimed status is never applied directly.
    pub async fn handle_callback(
        &self,
        req: CallbackRequest,
    ) -> Result<TransactionStatus, PaymentError> {
        let txn = self
            .transactions_repo
            .get(req.transaction_id)
            .await?
            .ok_or_else(|| not_found("transaction"))?;

        // A still-pending attempt is only open while its session is; an
        // overdue one gets flipped to EXPIRED here rather than waiting for
        // the sweep.
        if txn.status == TransactionStatus::Pending {
            self.sessions.validate(&txn.session_id).await?;
        }

        let order_id = txn
            .gateway_transaction_id
            .clone()
            .or_else(|| req.gateway_transaction_id.clone())
            .ok_or_else(|| validation("transaction has no gateway reference"))?;

        let remote = self
            .gateway
            .fetch_payment_status(&order_id)
            .await
            .map_err(map_gateway_error)?;

        let payload_json = serde_json::json!({
            "claimed_status": req.status,
            "gateway_order_id": order_id,
            "verified_remote": remote,
        });

        let event = match remote {
            RemoteStatus::Captured { .. } => VerifiedEvent {
                outcome: ReportedOutcome::Success,
                gateway_payment_id: order_id,
                error_code: None,
            },
            RemoteStatus::Failed { ref error_code } => VerifiedEvent {
                outcome: ReportedOutcome::Failed,
                gateway_payment_id: order_id,
                error_code: Some(error_code.clone()),
            },
            RemoteStatus::Pending => {
                // Nothing to finalize yet; the webhook will settle it.
                self.append_log(
                    req.transaction_id,
                    NotificationSource::Advisory,
                    &payload_json,
                    None,
                    true,
                    "remote still pending",
                )
                .await;
                return Ok(txn.status);
            }
        };

        self.apply(
            req.transaction_id,
            NotificationSource::Advisory,
            event,
            payload_json,
            None,
        )
        .await
    }

    pub async fn apply_remote_status(
        &self,
        transaction_id: Uuid,
        remote: RemoteStatus,
    ) -> Result<TransactionStatus, PaymentError> {
        let payload_json = serde_json::json!({ "polled_remote": remote });
        let event = match remote {
            RemoteStatus::Captured { .. } => VerifiedEvent {
                outcome: ReportedOutcome::Success,
                gateway_payment_id: String::new(),
                error_code: None,
            },
            RemoteStatus::Failed { ref error_code } => VerifiedEvent {
                outcome: ReportedOutcome::Failed,
                gateway_payment_id: String::new(),
                error_code: Some(error_code.clone()),
            },
            RemoteStatus::Pending => {
                let txn = self
                    .transactions_repo
                    .get(transaction_id)
                    .await?
                    .ok_or_else(|| not_found("transaction"))?;
                return Ok(txn.status);
            }
        };

        self.apply(
            transaction_id,
            NotificationSource::Advisory,
            event,
            payload_json,
            None,
        )
        .await
    }

    async fn apply(
        &self,
        transaction_id: Uuid,
        source: NotificationSource,
        event: VerifiedEvent,
        payload_json: serde_json::Value,
        signature_valid: Option<bool>,
    ) -> Result<TransactionStatus, PaymentError> {
        let result = with_cas_retry(self.retry_policy, || {
            let event = VerifiedEvent {
                outcome: event.outcome,
                gateway_payment_id: event.gateway_payment_id.clone(),
                error_code: event.error_code.clone(),
            };
            let payload_json = payload_json.clone();
            async move {
                self.apply_once(transaction_id, source, event, payload_json, signature_valid)
                    .await
            }
        })
        .await;

        if matches!(result, Err(PaymentError::Conflict)) {
            self.append_log(
                transaction_id,
                source,
                &payload_json,
                signature_valid,
                false,
                "conflict retries exhausted",
            )
            .await;
        }

        result
    }

    async fn apply_once(
        &self,
        transaction_id: Uuid,
        source: NotificationSource,
        event: VerifiedEvent,
        payload_json: serde_json::Value,
        signature_valid: Option<bool>,
    ) -> Result<CasAttempt<TransactionStatus>, PaymentError> {
        let txn = self
            .transactions_repo
            .get(transaction_id)
            .await?
            .ok_or_else(|| not_found("transaction"))?;

        let authoritative_seen = match source {
            NotificationSource::Advisory => {
                self.notification_log.has_authoritative(transaction_id).await?
            }
            NotificationSource::Authoritative => false,
        };

        match reconcile(txn.status, source, event.outcome, authoritative_seen) {
            ReconcileDecision::RecordOnly(reason) => {
                self.append_log(
                    transaction_id,
                    source,
                    &payload_json,
                    signature_valid,
                    true,
                    reason,
                )
                .await;
                Ok(CasAttempt::Applied(txn.status))
            }
            ReconcileDecision::Apply(TransactionStatus::Success) => {
                if !self.settle_success(&txn, &event).await? {
                    return Ok(CasAttempt::Conflict);
                }
                self.append_log(
                    transaction_id,
                    source,
                    &payload_json,
                    signature_valid,
                    true,
                    "success applied",
                )
                .await;
                self.dispatch_success_effects(&txn).await;
                Ok(CasAttempt::Applied(TransactionStatus::Success))
            }
            ReconcileDecision::Apply(_) => {
                let code = event.error_code.as_deref().unwrap_or("UNKNOWN");
                let category = categorize_gateway_error(code);
                let applied = self
                    .transactions_repo
                    .cas_mark_failed(
                        transaction_id,
                        txn.version,
                        TransactionStatus::Failed,
                        Some(code),
                        category.as_str(),
                        "gateway reported payment failure",
                    )
                    .await?;
                if !applied {
                    return Ok(CasAttempt::Conflict);
                }
                self.sessions.cancel(&txn.session_id).await?;
                self.append_log(
                    transaction_id,
                    source,
                    &payload_json,
                    signature_valid,
                    true,
                    "failure applied",
                )
                .await;
                Ok(CasAttempt::Applied(TransactionStatus::Failed))
            }
        }
    }

    /// Success write and enrollment activation commit or roll back as one
    /// unit; a transaction is never SUCCESS without its access grant.
    async fn settle_success(
        &self,
        txn: &Transaction,
        event: &VerifiedEvent,
    ) -> Result<bool, PaymentError> {
        let course = self.catalog.get_course(&txn.course_id).await?;

        let mut db_tx = self
            .pool
            .begin()
            .await
            .context("begin settle transaction")
            .map_err(PaymentError::Internal)?;

        let gateway_payment_id = if event.gateway_payment_id.is_empty() {
            txn.gateway_transaction_id.clone().unwrap_or_default()
        } else {
            event.gateway_payment_id.clone()
        };

        let applied = TransactionsRepo::cas_mark_success_tx(
            &mut db_tx,
            txn.transaction_id,
            txn.version,
            &gateway_payment_id,
        )
        .await?;
        if !applied {
            db_tx.rollback().await.ok();
            return Ok(false);
        }

        EnrollmentsRepo::activate_tx(
            &mut db_tx,
            &txn.student_id,
            &txn.course_id,
            txn.transaction_id,
        )
        .await?;

        if let Some(org) = course.as_ref().and_then(|c| c.organization_id.clone()) {
            EnrollmentsRepo::link_organization_tx(&mut db_tx, &org, &txn.student_id).await?;
        }

        db_tx
            .commit()
            .await
            .context("commit settle transaction")
            .map_err(PaymentError::Internal)?;

        self.sessions.complete(&txn.session_id).await?;
        Ok(true)
    }

    async fn dispatch_success_effects(&self, txn: &Transaction) {
        self.side_effects.enqueue(SideEffect::ReceiptGeneration {
            transaction_id: txn.transaction_id,
        });
        self.side_effects.enqueue(SideEffect::RealtimePush {
            student_id: txn.student_id.clone(),
            course_id: txn.course_id.clone(),
        });

        let email = self.catalog.get_user(&txn.student_id).await;
        let course = self.catalog.get_course(&txn.course_id).await;
        match (email, course) {
            (Ok(Some(user)), Ok(course)) => {
                self.side_effects.enqueue(SideEffect::ConfirmationEmail {
                    transaction_id: txn.transaction_id,
                    email: user.email,
                    course_title: course.map(|c| c.title).unwrap_or_default(),
                });
            }
            _ => tracing::warn!(
                transaction_id = %txn.transaction_id,
                "skipping confirmation email, user/course lookup failed"
            ),
        }
    }

    async fn flag_amount_drift(&self, transaction_id: Uuid, reported_minor: i64) {
        let Ok(Some(txn)) = self.transactions_repo.get(transaction_id).await else {
            return;
        };
        let expected = crate::amount::bankers_round(txn.final_amount + txn.gst_amount, 2);
        let reported = from_minor_units(reported_minor);
        if amounts_agree(expected, reported) {
            return;
        }

        let detail = serde_json::json!({
            "transaction_id": transaction_id,
            "expected_amount": expected,
            "reported_amount": reported,
        });
        tracing::warn!(%transaction_id, expected, reported, "webhook amount drift detected");
        if let Err(err) = self.security_log.record("webhook_amount_drift", detail).await {
            tracing::error!("failed to record amount drift: {err:#}");
        }
    }

    // Best-effort; losing an audit row must not fail the notification.
    async fn append_log(
        &self,
        transaction_id: Uuid,
        source: NotificationSource,
        payload: &serde_json::Value,
        signature_valid: Option<bool>,
        processed: bool,
        outcome: &str,
    ) {
        if let Err(err) = self
            .notification_log
            .append(transaction_id, source, payload, signature_valid, processed, outcome)
            .await
        {
            tracing::error!(%transaction_id, "failed to append notification log: {err:#}");
        }
    }
}

pub fn map_gateway_error(err: anyhow::Error) -> PaymentError {
    if err
        .downcast_ref::<reqwest::Error>()
        .is_some_and(|e| e.is_timeout())
    {
        PaymentError::GatewayTimeout
    } else {
        PaymentError::Internal(err)
    }
}
