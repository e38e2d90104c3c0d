use chrono::Utc;
use course_payments::domain::transaction::{Transaction, TransactionStatus};
use course_payments::error::PaymentError;
use course_payments::service::payment_service::plan_refund;
use uuid::Uuid;

fn settled_txn(final_amount: f64, refund_amount: f64, status: TransactionStatus) -> Transaction {
    Transaction {
        transaction_id: Uuid::new_v4(),
        student_id: "stu_1".to_string(),
        course_id: "course_1".to_string(),
        session_id: "ps_abc".to_string(),
        original_amount: final_amount,
        discount_amount: 0.0,
        discount_code: None,
        discount_percentage: None,
        final_amount,
        gst_amount: course_payments::amount::compute_gst(final_amount),
        currency: "INR".to_string(),
        status,
        gateway_transaction_id: Some("pay_1".to_string()),
        error_code: None,
        error_category: None,
        error_message: None,
        retry_count: 0,
        last_retry_at: None,
        retried_from: None,
        refund_amount,
        refund_reason: None,
        refunded_at: None,
        initiated_at: Utc::now(),
        completed_at: Some(Utc::now()),
        version: 1,
    }
}

#[test]
fn partial_refund_keeps_transaction_refundable() {
    let txn = settled_txn(1000.0, 0.0, TransactionStatus::Success);
    let plan = plan_refund(&txn, 600.0).unwrap();
    assert_eq!(plan.refund_total, 600.0);
    assert_eq!(plan.new_status, TransactionStatus::PartialRefund);
}

#[test]
fn refund_reaching_full_amount_settles_as_refunded() {
    let txn = settled_txn(1000.0, 600.0, TransactionStatus::PartialRefund);
    let plan = plan_refund(&txn, 400.0).unwrap();
    assert_eq!(plan.refund_total, 1000.0);
    assert_eq!(plan.new_status, TransactionStatus::Refunded);
}

#[test]
fn concurrent_contenders_cannot_both_pass_the_balance_check() {
    // Both contenders read the same row; the loser of the conditional write
    // re-plans against the row the winner committed.
    let original = settled_txn(1000.0, 0.0, TransactionStatus::Success);
    let first = plan_refund(&original, 600.0).unwrap();
    assert_eq!(first.new_status, TransactionStatus::PartialRefund);

    let mut after_first = original.clone();
    after_first.refund_amount = first.refund_total;
    after_first.status = first.new_status;
    after_first.version += 1;

    let err = plan_refund(&after_first, 600.0).unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));
    // The remaining balance is still refundable.
    assert!(plan_refund(&after_first, 400.0).is_ok());
}

#[test]
fn single_refund_over_balance_is_rejected() {
    let txn = settled_txn(1000.0, 0.0, TransactionStatus::Success);
    assert!(matches!(
        plan_refund(&txn, 1000.01),
        Err(PaymentError::Validation(_))
    ));
}

#[test]
fn refund_rejected_outside_refundable_states() {
    for status in [
        TransactionStatus::Pending,
        TransactionStatus::Failed,
        TransactionStatus::Expired,
        TransactionStatus::Refunded,
    ] {
        let txn = settled_txn(1000.0, 0.0, status);
        assert!(
            matches!(plan_refund(&txn, 100.0), Err(PaymentError::InvalidState(_))),
            "status {}",
            status.as_str()
        );
    }
}
