use course_payments::domain::notification::{
    reconcile, NotificationSource, ReconcileDecision, ReportedOutcome,
};
use course_payments::domain::transaction::TransactionStatus;

#[test]
fn authoritative_success_applies_on_pending() {
    let decision = reconcile(
        TransactionStatus::Pending,
        NotificationSource::Authoritative,
        ReportedOutcome::Success,
        false,
    );
    assert!(matches!(
        decision,
        ReconcileDecision::Apply(TransactionStatus::Success)
    ));
}

#[test]
fn authoritative_failure_applies_on_pending() {
    let decision = reconcile(
        TransactionStatus::Pending,
        NotificationSource::Authoritative,
        ReportedOutcome::Failed,
        false,
    );
    assert!(matches!(
        decision,
        ReconcileDecision::Apply(TransactionStatus::Failed)
    ));
}

#[test]
fn duplicate_of_settled_outcome_is_record_only() {
    let decision = reconcile(
        TransactionStatus::Success,
        NotificationSource::Authoritative,
        ReportedOutcome::Success,
        false,
    );
    assert!(matches!(decision, ReconcileDecision::RecordOnly(_)));
}

#[test]
fn conflicting_outcome_never_overrides_terminal_state() {
    let decision = reconcile(
        TransactionStatus::Success,
        NotificationSource::Authoritative,
        ReportedOutcome::Failed,
        false,
    );
    assert!(matches!(decision, ReconcileDecision::RecordOnly(_)));

    let decision = reconcile(
        TransactionStatus::Failed,
        NotificationSource::Authoritative,
        ReportedOutcome::Success,
        false,
    );
    assert!(matches!(decision, ReconcileDecision::RecordOnly(_)));
}

#[test]
fn advisory_applies_only_before_any_authoritative_event() {
    let decision = reconcile(
        TransactionStatus::Pending,
        NotificationSource::Advisory,
        ReportedOutcome::Success,
        false,
    );
    assert!(matches!(
        decision,
        ReconcileDecision::Apply(TransactionStatus::Success)
    ));

    let decision = reconcile(
        TransactionStatus::Pending,
        NotificationSource::Advisory,
        ReportedOutcome::Success,
        true,
    );
    assert!(matches!(decision, ReconcileDecision::RecordOnly(_)));
}

#[test]
fn advisory_after_terminal_is_record_only() {
    for outcome in [ReportedOutcome::Success, ReportedOutcome::Failed] {
        let decision = reconcile(
            TransactionStatus::Expired,
            NotificationSource::Advisory,
            outcome,
            false,
        );
        assert!(matches!(decision, ReconcileDecision::RecordOnly(_)));
    }
}
