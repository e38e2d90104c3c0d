use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use course_payments::error::PaymentError;
use course_payments::service::retry::{with_cas_retry, CasAttempt, RetryPolicy};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn applies_on_first_attempt() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let result = with_cas_retry(fast_policy(), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(CasAttempt::Applied(42))
        }
    })
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_past_transient_conflicts() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let result = with_cas_retry(fast_policy(), move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(CasAttempt::Conflict)
            } else {
                Ok(CasAttempt::Applied("won"))
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), "won");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhaustion_surfaces_as_conflict() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let result: Result<(), _> = with_cas_retry(fast_policy(), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(CasAttempt::Conflict)
        }
    })
    .await;

    assert!(matches!(result, Err(PaymentError::Conflict)));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn hard_errors_are_not_retried() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let result: Result<(), _> = with_cas_retry(fast_policy(), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(PaymentError::NotFound("transaction".to_string()))
        }
    })
    .await;

    assert!(matches!(result, Err(PaymentError::NotFound(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn backoff_schedule_doubles() {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(50),
    };
    assert_eq!(policy.backoff(0), Duration::from_millis(50));
    assert_eq!(policy.backoff(1), Duration::from_millis(100));
    assert_eq!(policy.backoff(2), Duration::from_millis(200));
}
