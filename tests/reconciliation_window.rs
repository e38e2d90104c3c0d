use chrono::{Duration, TimeZone, Utc};
use course_payments::domain::transaction::{Transaction, TransactionStatus};
use course_payments::gateways::LedgerEntry;
use course_payments::service::reconciliation::{classify_window, previous_day_window};
use uuid::Uuid;

fn txn(status: TransactionStatus, final_amount: f64, gateway_id: Option<&str>) -> Transaction {
    Transaction {
        transaction_id: Uuid::new_v4(),
        student_id: "stu_1".to_string(),
        course_id: "course_1".to_string(),
        session_id: "ps_x".to_string(),
        original_amount: final_amount,
        discount_amount: 0.0,
        discount_code: None,
        discount_percentage: None,
        final_amount,
        gst_amount: course_payments::amount::compute_gst(final_amount),
        currency: "INR".to_string(),
        status,
        gateway_transaction_id: gateway_id.map(str::to_string),
        error_code: None,
        error_category: None,
        error_message: None,
        retry_count: 0,
        last_retry_at: None,
        retried_from: None,
        refund_amount: 0.0,
        refund_reason: None,
        refunded_at: None,
        initiated_at: Utc::now(),
        completed_at: None,
        version: 1,
    }
}

fn entry(txn: &Transaction, gateway_id: &str, amount_minor: i64, captured: bool) -> LedgerEntry {
    LedgerEntry {
        gateway_transaction_id: gateway_id.to_string(),
        reference: Some(txn.transaction_id),
        amount_minor,
        captured,
        settled_at: Utc::now(),
    }
}

#[test]
fn agreeing_sides_match() {
    let local = txn(TransactionStatus::Success, 800.0, Some("pay_1"));
    // 800 + 144 GST = 944.00 = 94400 paise.
    let remote = vec![entry(&local, "pay_1", 94_400, true)];

    let out = classify_window(&[local], &remote);
    assert_eq!(out.matched, 1);
    assert!(out.discrepancies.is_empty());
    assert!(out.unmatched_local.is_empty());
    assert!(out.unmatched_remote.is_empty());
}

#[test]
fn amount_disagreement_is_a_discrepancy_with_delta() {
    let local = txn(TransactionStatus::Success, 800.0, Some("pay_1"));
    let remote = vec![entry(&local, "pay_1", 90_000, true)];

    let out = classify_window(&[local], &remote);
    assert_eq!(out.matched, 0);
    assert_eq!(out.discrepancies.len(), 1);
    assert_eq!(out.discrepancies[0].delta_minor, 90_000 - 94_400);
}

#[test]
fn capture_without_local_settlement_is_a_discrepancy() {
    let local = txn(TransactionStatus::Failed, 800.0, Some("pay_1"));
    let remote = vec![entry(&local, "pay_1", 94_400, true)];

    let out = classify_window(&[local], &remote);
    assert_eq!(out.discrepancies.len(), 1);
    assert_eq!(out.discrepancies[0].note, "captured remotely but not settled locally");
}

#[test]
fn one_sided_records_are_unmatched() {
    let settled_here_only = txn(TransactionStatus::Success, 800.0, Some("pay_1"));
    let stranger = LedgerEntry {
        gateway_transaction_id: "pay_unknown".to_string(),
        reference: None,
        amount_minor: 50_000,
        captured: true,
        settled_at: Utc::now(),
    };

    let out = classify_window(&[settled_here_only], &[stranger]);
    assert_eq!(out.unmatched_local.len(), 1);
    assert_eq!(out.unmatched_remote, vec!["pay_unknown".to_string()]);
}

#[test]
fn failed_attempt_absent_on_both_sides_is_consistent() {
    let local = txn(TransactionStatus::Failed, 800.0, None);
    let out = classify_window(&[local], &[]);
    assert_eq!(out.matched, 1);
    assert!(out.unmatched_local.is_empty());
}

#[test]
fn rerun_over_unchanged_data_is_identical() {
    let a = txn(TransactionStatus::Success, 800.0, Some("pay_1"));
    let b = txn(TransactionStatus::Success, 1000.0, Some("pay_2"));
    let c = txn(TransactionStatus::Failed, 500.0, Some("pay_3"));
    let remote = vec![
        entry(&a, "pay_1", 94_400, true),
        entry(&b, "pay_2", 100_000, true),
    ];
    let local = vec![a, b, c];

    let first = classify_window(&local, &remote);
    let second = classify_window(&local, &remote);
    assert_eq!(first.matched, second.matched);
    assert_eq!(first.discrepancies.len(), second.discrepancies.len());
    assert_eq!(first.unmatched_local, second.unmatched_local);
    assert_eq!(first.unmatched_remote, second.unmatched_remote);
}

#[test]
fn window_covers_previous_utc_day() {
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 4, 30, 0).unwrap();
    let (start, end) = previous_day_window(now);
    assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap());
    assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap());
    assert_eq!(end - start, Duration::days(1));
}
