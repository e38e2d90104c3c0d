use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::amount::{self, AmountBreakdown, Discount};
use crate::domain::transaction::{retry_allowed, Transaction, TransactionStatus};
use crate::error::{not_found, validation, PaymentError};
use crate::gateways::{to_minor_units, IntentRequest, PaymentGateway};
use crate::repo::catalog_repo::{CatalogRepo, DiscountRecord};
use crate::repo::transactions_repo::{NewTransaction, TransactionsRepo};
use crate::service::monitoring::LatencyStore;
use crate::service::notification_processor::{map_gateway_error, NotificationProcessor};
use crate::service::retry::{with_cas_retry, CasAttempt, RetryPolicy};
use crate::service::sessions::SessionManager;

#[derive(Debug, serde::Serialize)]
pub struct InitiateResponse {
    pub transaction_id: Uuid,
    pub session_id: String,
    pub payment_url: Option<String>,
    pub client_secret: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub amounts: AmountBreakdown,
}

#[derive(Debug, serde::Serialize)]
pub struct StatusResponse {
    pub transaction: Transaction,
    /// True when the gateway was re-polled for this answer.
    pub live_checked: bool,
}

#[derive(Clone)]
pub struct PaymentService {
    pub transactions_repo: TransactionsRepo,
    pub sessions: SessionManager,
    pub catalog: CatalogRepo,
    pub gateway: Arc<dyn PaymentGateway>,
    pub latency_store: LatencyStore,
    pub processor: NotificationProcessor,
    pub retry_policy: RetryPolicy,
}

impl PaymentService {
    pub async fn initiate(
        &self,
        student_id: &str,
        course_id: &str,
        discount_code: Option<&str>,
    ) -> Result<InitiateResponse, PaymentError> {
        let student = self
            .catalog
            .get_user(student_id)
            .await?
            .ok_or_else(|| not_found("student"))?;
        let course = self
            .catalog
            .get_course(course_id)
            .await?
            .ok_or_else(|| not_found("course"))?;
        if !course.is_published {
            return Err(validation("course is not open for enrollment"));
        }

        let discount = match discount_code {
            Some(code) => Some(
                self.catalog
                    .get_discount(code)
                    .await?
                    .ok_or_else(|| validation("discount code is invalid or expired"))?,
            ),
            None => None,
        };

        let amounts = amount::quote(course.price, discount.as_ref().map(as_discount))?;

        let transaction_id = Uuid::new_v4();
        let session = self
            .sessions
            .create(transaction_id, &student.user_id, course_id, amounts.total_payable)
            .await?;

        self.transactions_repo
            .insert(&NewTransaction {
                transaction_id,
                student_id: student.user_id.clone(),
                course_id: course_id.to_string(),
                session_id: session.session_id.clone(),
                original_amount: amounts.original_amount,
                discount_amount: amounts.discount_amount,
                discount_code: discount.as_ref().map(|d| d.code.clone()),
                discount_percentage: discount.as_ref().and_then(|d| d.percentage),
                final_amount: amounts.final_amount,
                gst_amount: amounts.gst_amount,
                retried_from: None,
            })
            .await?;

        let intent = self
            .open_gateway_intent(transaction_id, &student.user_id, course_id, &amounts)
            .await?;

        Ok(InitiateResponse {
            transaction_id,
            session_id: session.session_id,
            payment_url: intent.payment_url,
            client_secret: intent.client_secret,
            expires_at: session.expires_at,
            amounts,
        })
    }

    async fn open_gateway_intent(
        &self,
        transaction_id: Uuid,
        student_id: &str,
        course_id: &str,
        amounts: &AmountBreakdown,
    ) -> Result<crate::gateways::PaymentIntent, PaymentError> {
        let request = IntentRequest {
            transaction_id,
            amount_minor: to_minor_units(amounts.total_payable),
            currency: "INR".to_string(),
            student_id: student_id.to_string(),
            course_id: course_id.to_string(),
        };

        let start = Instant::now();
        let result = self.gateway.create_payment_request(&request).await;
        self.record_latency(start).await;

        match result {
            Ok(intent) => {
                self.transactions_repo
                    .set_gateway_order(transaction_id, &intent.gateway_order_id)
                    .await?;
                Ok(intent)
            }
            Err(err) => {
                let mapped = map_gateway_error(err);
                // The attempt is dead on arrival; close it out so the caller
                // can retry with a fresh transaction.
                let category = if matches!(mapped, PaymentError::GatewayTimeout) {
                    "network"
                } else {
                    "other"
                };
                if let Ok(Some(txn)) = self.transactions_repo.get(transaction_id).await {
                    let _ = self
                        .transactions_repo
                        .cas_mark_failed(
                            transaction_id,
                            txn.version,
                            TransactionStatus::Failed,
                            Some("GATEWAY_UNREACHABLE"),
                            category,
                            "could not open payment intent with gateway",
                        )
                        .await;
                    let _ = self.sessions.cancel(&txn.session_id).await;
                }
                Err(mapped)
            }
        }
    }

    pub async fn check_status(
        &self,
        caller_id: &str,
        is_admin: bool,
        transaction_id: Uuid,
    ) -> Result<StatusResponse, PaymentError> {
        let txn = self
            .transactions_repo
            .get(transaction_id)
            .await?
            .ok_or_else(|| not_found("transaction"))?;
        if txn.student_id != caller_id && !is_admin {
            return Err(PaymentError::Forbidden);
        }

        let mut live_checked = false;
        if txn.status == TransactionStatus::Pending {
            if let Some(order_id) = txn.gateway_transaction_id.clone() {
                let start = Instant::now();
                let remote = self.gateway.fetch_payment_status(&order_id).await;
                self.record_latency(start).await;

                match remote {
                    Ok(remote) => {
                        live_checked = true;
                        self.processor.apply_remote_status(transaction_id, remote).await?;
                    }
                    Err(err) => {
                        tracing::warn!(%transaction_id, "status re-poll failed: {err:#}");
                    }
                }
            }
        }

        let transaction = self
            .transactions_repo
            .get(transaction_id)
            .await?
            .ok_or_else(|| not_found("transaction"))?;

        Ok(StatusResponse {
            transaction,
            live_checked,
        })
    }

    pub async fn history(
        &self,
        student_id: &str,
        page: i64,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>, PaymentError> {
        Ok(self
            .transactions_repo
            .list_by_student(student_id, page, 20, status)
            .await?)
    }

    /// Admin/finance only (enforced at the HTTP layer). The balance check runs
    /// on every CAS attempt, so two concurrent refunds can never both reserve
    /// against the same balance; the gateway refund is issued only after the
    /// local reservation has committed, and rolled back if the provider call
    /// fails.
    pub async fn refund(
        &self,
        transaction_id: Uuid,
        refund_amount: f64,
        reason: &str,
    ) -> Result<Transaction, PaymentError> {
        amount::validate_amount_precision(refund_amount)?;
        if refund_amount <= 0.0 {
            return Err(validation("refund amount must be positive"));
        }

        let reason = reason.to_string();
        let (reserved, gateway_payment_id) = with_cas_retry(self.retry_policy, || {
            let reason = reason.clone();
            async move {
                let txn = self
                    .transactions_repo
                    .get(transaction_id)
                    .await?
                    .ok_or_else(|| not_found("transaction"))?;
                let plan = plan_refund(&txn, refund_amount)?;
                let gateway_payment_id = txn
                    .gateway_transaction_id
                    .clone()
                    .ok_or_else(|| validation("transaction has no gateway reference"))?;

                let applied = self
                    .transactions_repo
                    .cas_apply_refund(
                        transaction_id,
                        txn.version,
                        plan.new_status,
                        plan.refund_total,
                        &reason,
                    )
                    .await?;
                Ok(if applied {
                    CasAttempt::Applied((txn, gateway_payment_id))
                } else {
                    CasAttempt::Conflict
                })
            }
        })
        .await?;

        let start = Instant::now();
        let outcome = match self
            .gateway
            .initiate_refund(&gateway_payment_id, to_minor_units(refund_amount))
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                self.record_latency(start).await;
                // The provider never received the refund; put the reserved
                // balance back.
                let restored = self
                    .transactions_repo
                    .cas_restore_refund_state(transaction_id, reserved.version + 1, &reserved)
                    .await?;
                if !restored {
                    tracing::error!(
                        %transaction_id,
                        "refund reservation could not be rolled back after gateway failure"
                    );
                }
                return Err(map_gateway_error(err));
            }
        };
        self.record_latency(start).await;
        tracing::info!(%transaction_id, refund_id = %outcome.gateway_refund_id, "gateway refund issued");

        self.transactions_repo
            .get(transaction_id)
            .await?
            .ok_or_else(|| not_found("transaction"))
    }

    /// Spawns a sibling transaction for a failed attempt; the original is only
    /// touched to bump its retry counter.
    pub async fn retry(
        &self,
        caller_id: &str,
        transaction_id: Uuid,
    ) -> Result<InitiateResponse, PaymentError> {
        let original = self
            .transactions_repo
            .get(transaction_id)
            .await?
            .ok_or_else(|| not_found("transaction"))?;
        if original.student_id != caller_id {
            return Err(PaymentError::Forbidden);
        }
        retry_allowed(&original, Utc::now()).map_err(validation)?;

        self.transactions_repo.bump_retry(transaction_id).await?;

        let amounts = AmountBreakdown {
            original_amount: original.original_amount,
            discount_amount: original.discount_amount,
            final_amount: original.final_amount,
            gst_amount: original.gst_amount,
            total_payable: amount::bankers_round(original.final_amount + original.gst_amount, 2),
        };

        let sibling_id = Uuid::new_v4();
        let session = self
            .sessions
            .create(
                sibling_id,
                &original.student_id,
                &original.course_id,
                amounts.total_payable,
            )
            .await?;

        self.transactions_repo
            .insert(&NewTransaction {
                transaction_id: sibling_id,
                student_id: original.student_id.clone(),
                course_id: original.course_id.clone(),
                session_id: session.session_id.clone(),
                original_amount: original.original_amount,
                discount_amount: original.discount_amount,
                discount_code: original.discount_code.clone(),
                discount_percentage: original.discount_percentage,
                final_amount: original.final_amount,
                gst_amount: original.gst_amount,
                retried_from: Some(transaction_id),
            })
            .await?;

        let intent = self
            .open_gateway_intent(sibling_id, &original.student_id, &original.course_id, &amounts)
            .await?;

        Ok(InitiateResponse {
            transaction_id: sibling_id,
            session_id: session.session_id,
            payment_url: intent.payment_url,
            client_secret: intent.client_secret,
            expires_at: session.expires_at,
            amounts,
        })
    }

    async fn record_latency(&self, start: Instant) {
        let latency_ms = start.elapsed().as_millis() as i64;
        if let Err(err) = self.latency_store.record(latency_ms).await {
            tracing::debug!("failed to record gateway latency sample: {err}");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefundPlan {
    pub refund_total: f64,
    pub new_status: TransactionStatus,
}

/// Validates one refund request against the row as currently read and computes
/// the resulting bookkeeping. Runs on every CAS attempt, so a concurrent
/// refund that lands first shrinks the balance this one is checked against.
pub fn plan_refund(txn: &Transaction, refund_amount: f64) -> Result<RefundPlan, PaymentError> {
    if !matches!(
        txn.status,
        TransactionStatus::Success | TransactionStatus::PartialRefund
    ) {
        return Err(PaymentError::InvalidState(format!(
            "cannot refund a {} transaction",
            txn.status.as_str()
        )));
    }
    if refund_amount > txn.refundable_balance() + 0.001 {
        return Err(validation("refund exceeds remaining refundable balance"));
    }

    let refund_total = amount::bankers_round(txn.refund_amount + refund_amount, 2);
    let new_status = if refund_total >= txn.final_amount - 0.001 {
        TransactionStatus::Refunded
    } else {
        TransactionStatus::PartialRefund
    };
    Ok(RefundPlan {
        refund_total,
        new_status,
    })
}

fn as_discount(record: &DiscountRecord) -> Discount {
    match (record.percentage, record.fixed_amount) {
        (Some(pct), _) => Discount::Percentage(pct),
        (None, Some(fixed)) => Discount::Fixed(fixed),
        (None, None) => Discount::Fixed(0.0),
    }
}
