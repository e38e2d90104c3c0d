use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Expired,
    Refunded,
    PartialRefund,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Expired => "EXPIRED",
            TransactionStatus::Refunded => "REFUNDED",
            TransactionStatus::PartialRefund => "PARTIAL_REFUND",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TransactionStatus::Pending),
            "SUCCESS" => Some(TransactionStatus::Success),
            "FAILED" => Some(TransactionStatus::Failed),
            "EXPIRED" => Some(TransactionStatus::Expired),
            "REFUNDED" => Some(TransactionStatus::Refunded),
            "PARTIAL_REFUND" => Some(TransactionStatus::PartialRefund),
            _ => None,
        }
    }

    /// Terminal states never transition again, except SUCCESS which may still
    /// move into the refund states.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// The only legal edges of the state machine. Everything else is rejected so a
/// late or duplicate notification can never resurrect a settled transaction.
pub fn transition_allowed(from: TransactionStatus, to: TransactionStatus) -> bool {
    use TransactionStatus::*;
    matches!(
        (from, to),
        (Pending, Success)
            | (Pending, Failed)
            | (Pending, Expired)
            | (Success, Refunded)
            | (Success, PartialRefund)
            | (PartialRefund, Refunded)
            | (PartialRefund, PartialRefund)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InsufficientFunds,
    CardDeclined,
    Network,
    Expired,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InsufficientFunds => "insufficient_funds",
            ErrorCategory::CardDeclined => "card_declined",
            ErrorCategory::Network => "network",
            ErrorCategory::Expired => "expired",
            ErrorCategory::Other => "other",
        }
    }
}

/// Maps a provider error code onto the closed reporting set.
pub fn categorize_gateway_error(code: &str) -> ErrorCategory {
    let code = code.to_ascii_uppercase();
    if code.contains("INSUFFICIENT") || code == "BAD_REQUEST_PAYMENT_FAILED_INSUFFICIENT_BALANCE" {
        ErrorCategory::InsufficientFunds
    } else if code.contains("DECLINED") || code.contains("CARD") {
        ErrorCategory::CardDeclined
    } else if code.contains("TIMEOUT") || code.contains("NETWORK") || code.starts_with("HTTP_5") {
        ErrorCategory::Network
    } else if code.contains("EXPIRED") {
        ErrorCategory::Expired
    } else {
        ErrorCategory::Other
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub student_id: String,
    pub course_id: String,
    pub session_id: String,
    pub original_amount: f64,
    pub discount_amount: f64,
    pub discount_code: Option<String>,
    pub discount_percentage: Option<f64>,
    pub final_amount: f64,
    pub gst_amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    pub gateway_transaction_id: Option<String>,
    pub error_code: Option<String>,
    pub error_category: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub retried_from: Option<Uuid>,
    pub refund_amount: f64,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic-lock token; every mutating write is conditional on it.
    pub version: i32,
}

impl Transaction {
    pub fn refundable_balance(&self) -> f64 {
        crate::amount::bankers_round(self.final_amount - self.refund_amount, 2)
    }
}

pub const MAX_RETRIES: i32 = 3;
pub const RETRY_WINDOW_HOURS: i64 = 24;

/// Retry spawns a sibling transaction; the original must still be inside its
/// retry budget and its 24h window.
pub fn retry_allowed(txn: &Transaction, now: DateTime<Utc>) -> Result<(), String> {
    if txn.status != TransactionStatus::Failed {
        return Err("only failed transactions can be retried".to_string());
    }
    if txn.retry_count >= MAX_RETRIES {
        return Err(format!("retry limit of {MAX_RETRIES} reached"));
    }
    if now - txn.initiated_at > chrono::Duration::hours(RETRY_WINDOW_HOURS) {
        return Err("retry window of 24h has elapsed".to_string());
    }
    Ok(())
}
