use chrono::{Duration, Utc};
use course_payments::domain::session::{
    check_session, new_session_id, session_expiry, PaymentSession, SessionCheck, SessionStatus,
    SESSION_TTL_MINUTES,
};
use uuid::Uuid;

fn active_session(now: chrono::DateTime<Utc>) -> PaymentSession {
    PaymentSession {
        session_id: new_session_id(),
        transaction_id: Uuid::new_v4(),
        student_id: "stu_1".to_string(),
        course_id: "course_1".to_string(),
        amount: 944.0,
        status: SessionStatus::Active,
        created_at: now,
        expires_at: session_expiry(now),
    }
}

#[test]
fn session_ids_are_long_and_unique() {
    let ids: std::collections::HashSet<String> = (0..1000).map(|_| new_session_id()).collect();
    assert_eq!(ids.len(), 1000);
    for id in &ids {
        // "ps_" prefix plus 32 hex chars (128 bits).
        assert!(id.starts_with("ps_"));
        assert_eq!(id.len(), 35);
    }
}

#[test]
fn ttl_is_fifteen_minutes() {
    let now = Utc::now();
    assert_eq!(session_expiry(now) - now, Duration::minutes(SESSION_TTL_MINUTES));
    assert_eq!(SESSION_TTL_MINUTES, 15);
}

#[test]
fn expiry_check_is_strict() {
    let now = Utc::now();
    let session = PaymentSession {
        session_id: new_session_id(),
        transaction_id: Uuid::new_v4(),
        student_id: "stu_1".to_string(),
        course_id: "course_1".to_string(),
        amount: 944.0,
        status: SessionStatus::Active,
        created_at: now,
        expires_at: now + Duration::minutes(15),
    };

    assert!(!session.is_past_expiry(session.expires_at));
    assert!(session.is_past_expiry(session.expires_at + Duration::seconds(1)));
}

#[test]
fn only_active_is_non_terminal() {
    assert!(!SessionStatus::Active.is_terminal());
    assert!(SessionStatus::Completed.is_terminal());
    assert!(SessionStatus::Expired.is_terminal());
    assert!(SessionStatus::Cancelled.is_terminal());
}

#[test]
fn fresh_active_session_is_usable() {
    let now = Utc::now();
    let session = active_session(now);
    assert_eq!(check_session(&session, now), SessionCheck::Usable);
    assert_eq!(
        check_session(&session, session.expires_at),
        SessionCheck::Usable
    );
}

// An ACTIVE row past its deadline must be flipped to EXPIRED before the
// attempt is rejected; the check reports that as its own case.
#[test]
fn overdue_active_session_needs_the_expiry_write_back() {
    let now = Utc::now();
    let session = active_session(now);
    assert_eq!(
        check_session(&session, session.expires_at + Duration::seconds(1)),
        SessionCheck::Overdue
    );
}

#[test]
fn terminal_session_reports_its_stored_status() {
    let now = Utc::now();
    for status in [
        SessionStatus::Completed,
        SessionStatus::Expired,
        SessionStatus::Cancelled,
    ] {
        let mut session = active_session(now);
        session.status = status;
        assert_eq!(check_session(&session, now), SessionCheck::Closed(status));
    }
}

#[test]
fn status_round_trips_through_storage_form() {
    for status in [
        SessionStatus::Active,
        SessionStatus::Completed,
        SessionStatus::Expired,
        SessionStatus::Cancelled,
    ] {
        assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(SessionStatus::parse("bogus"), None);
}
