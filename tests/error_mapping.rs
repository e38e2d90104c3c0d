use axum::http::StatusCode;
use course_payments::error::{not_found, validation, PaymentError};

#[test]
fn taxonomy_maps_to_stable_http_codes() {
    assert_eq!(validation("bad").status(), StatusCode::BAD_REQUEST);
    assert_eq!(not_found("transaction").status(), StatusCode::NOT_FOUND);
    assert_eq!(PaymentError::GatewayTimeout.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(PaymentError::SignatureInvalid.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(PaymentError::Expired.status(), StatusCode::GONE);
    assert_eq!(
        PaymentError::InvalidState("session is EXPIRED".to_string()).status(),
        StatusCode::CONFLICT
    );
    assert_eq!(PaymentError::Forbidden.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        PaymentError::Internal(anyhow::anyhow!("boom")).status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

// The gateway's webhook delivery retries on 5xx; conflict exhaustion must be
// retryable, not a client error.
#[test]
fn cas_exhaustion_is_retryable_for_the_provider() {
    assert_eq!(PaymentError::Conflict.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(PaymentError::Conflict.status().is_server_error());
}

#[test]
fn envelope_carries_code_and_message() {
    let envelope = PaymentError::SignatureInvalid.envelope();
    assert_eq!(envelope.error.code, "SIGNATURE_INVALID");
    assert!(!envelope.error.message.is_empty());
    assert!(envelope.error.details.is_none());

    let envelope = PaymentError::InvalidState("session is EXPIRED".to_string()).envelope();
    assert_eq!(envelope.error.code, "INVALID_STATE");
    assert_eq!(envelope.error.details.as_deref(), Some("session is EXPIRED"));
}
