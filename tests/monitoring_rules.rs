use course_payments::service::monitoring::{
    evaluate_thresholds, moving_average, should_send_alert, success_rate, AlertKind,
    LATENCY_MAX_MS, SUCCESS_RATE_MIN,
};

#[test]
fn moving_average_of_samples() {
    assert_eq!(moving_average(&[]), None);
    assert_eq!(moving_average(&[100]), Some(100.0));
    assert_eq!(moving_average(&[100, 200, 300]), Some(200.0));
}

#[test]
fn success_rate_undefined_without_data() {
    assert_eq!(success_rate(0, 0), None);
    assert_eq!(success_rate(10, 9), Some(0.9));
}

#[test]
fn healthy_metrics_raise_nothing() {
    assert!(evaluate_thresholds(Some(0.95), Some(1200.0)).is_empty());
    assert!(evaluate_thresholds(Some(SUCCESS_RATE_MIN), Some(LATENCY_MAX_MS)).is_empty());
}

#[test]
fn missing_data_never_breaches() {
    assert!(evaluate_thresholds(None, None).is_empty());
}

#[test]
fn low_success_rate_breaches() {
    let breaches = evaluate_thresholds(Some(0.85), Some(1000.0));
    assert_eq!(breaches, vec![AlertKind::LowSuccessRate]);
}

#[test]
fn high_latency_breaches() {
    let breaches = evaluate_thresholds(Some(0.99), Some(6500.0));
    assert_eq!(breaches, vec![AlertKind::HighLatency]);
}

#[test]
fn both_thresholds_can_breach_in_one_sweep() {
    let breaches = evaluate_thresholds(Some(0.5), Some(9000.0));
    assert_eq!(
        breaches,
        vec![AlertKind::LowSuccessRate, AlertKind::HighLatency]
    );
}

#[test]
fn cooldown_token_controls_delivery() {
    assert!(should_send_alert(Ok(Some("OK".to_string()))));
    assert!(!should_send_alert(Ok(None)));
}

// An unreachable cooldown store must never silence monitoring.
#[test]
fn cooldown_store_errors_fail_open() {
    let err = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));
    assert!(should_send_alert(Err(err)));
}
