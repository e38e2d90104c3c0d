use chrono::{Duration, Utc};
use course_payments::domain::transaction::{
    categorize_gateway_error, retry_allowed, transition_allowed, ErrorCategory, Transaction,
    TransactionStatus,
};
use uuid::Uuid;

fn failed_txn(retry_count: i32, age_hours: i64) -> Transaction {
    Transaction {
        transaction_id: Uuid::new_v4(),
        student_id: "stu_1".to_string(),
        course_id: "course_1".to_string(),
        session_id: "ps_abc".to_string(),
        original_amount: 1000.0,
        discount_amount: 0.0,
        discount_code: None,
        discount_percentage: None,
        final_amount: 1000.0,
        gst_amount: 180.0,
        currency: "INR".to_string(),
        status: TransactionStatus::Failed,
        gateway_transaction_id: None,
        error_code: Some("CARD_DECLINED".to_string()),
        error_category: Some("card_declined".to_string()),
        error_message: None,
        retry_count,
        last_retry_at: None,
        retried_from: None,
        refund_amount: 0.0,
        refund_reason: None,
        refunded_at: None,
        initiated_at: Utc::now() - Duration::hours(age_hours),
        completed_at: None,
        version: 0,
    }
}

#[test]
fn pending_can_settle_three_ways() {
    use TransactionStatus::*;
    assert!(transition_allowed(Pending, Success));
    assert!(transition_allowed(Pending, Failed));
    assert!(transition_allowed(Pending, Expired));
}

#[test]
fn only_success_can_refund() {
    use TransactionStatus::*;
    assert!(transition_allowed(Success, Refunded));
    assert!(transition_allowed(Success, PartialRefund));
    assert!(!transition_allowed(Failed, Refunded));
    assert!(!transition_allowed(Expired, Refunded));
    assert!(!transition_allowed(Pending, Refunded));
}

#[test]
fn terminal_states_are_monotonic() {
    use TransactionStatus::*;
    for terminal in [Success, Failed, Expired, Refunded] {
        assert!(!transition_allowed(terminal, Pending));
    }
    assert!(!transition_allowed(Failed, Success));
    assert!(!transition_allowed(Expired, Success));
    assert!(!transition_allowed(Refunded, Success));
    // A failed attempt never resurrects; retry spawns a sibling row instead.
    assert!(!transition_allowed(Failed, Expired));
}

#[test]
fn partial_refund_can_continue_refunding() {
    use TransactionStatus::*;
    assert!(transition_allowed(PartialRefund, Refunded));
    assert!(transition_allowed(PartialRefund, PartialRefund));
}

#[test]
fn provider_error_codes_map_to_closed_set() {
    assert_eq!(
        categorize_gateway_error("BAD_REQUEST_PAYMENT_FAILED_INSUFFICIENT_BALANCE"),
        ErrorCategory::InsufficientFunds
    );
    assert_eq!(categorize_gateway_error("card_declined"), ErrorCategory::CardDeclined);
    assert_eq!(categorize_gateway_error("TIMEOUT"), ErrorCategory::Network);
    assert_eq!(categorize_gateway_error("HTTP_502"), ErrorCategory::Network);
    assert_eq!(categorize_gateway_error("LINK_EXPIRED"), ErrorCategory::Expired);
    assert_eq!(categorize_gateway_error("SOMETHING_ELSE"), ErrorCategory::Other);
}

#[test]
fn retry_allowed_within_budget_and_window() {
    assert!(retry_allowed(&failed_txn(0, 1), Utc::now()).is_ok());
    assert!(retry_allowed(&failed_txn(2, 23), Utc::now()).is_ok());
}

#[test]
fn retry_rejected_at_limit() {
    let err = retry_allowed(&failed_txn(3, 1), Utc::now()).unwrap_err();
    assert!(err.contains("retry limit"));
}

#[test]
fn retry_rejected_after_window_regardless_of_count() {
    let err = retry_allowed(&failed_txn(0, 25), Utc::now()).unwrap_err();
    assert!(err.contains("24h"));
}

#[test]
fn retry_rejected_for_non_failed_status() {
    let mut txn = failed_txn(0, 1);
    txn.status = TransactionStatus::Success;
    assert!(retry_allowed(&txn, Utc::now()).is_err());
}

#[test]
fn refundable_balance_tracks_partial_refunds() {
    let mut txn = failed_txn(0, 1);
    txn.status = TransactionStatus::PartialRefund;
    txn.refund_amount = 250.0;
    assert_eq!(txn.refundable_balance(), 750.0);
}
