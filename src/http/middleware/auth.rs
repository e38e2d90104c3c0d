use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::{validation, PaymentError};

/// Upstream auth middleware (out of scope here) authenticates the user and
/// forwards the identity in this header.
pub const STUDENT_HEADER: &str = "X-Student-Id";
pub const ADMIN_KEY_HEADER: &str = "X-Internal-Api-Key";

pub fn caller_id(headers: &HeaderMap) -> Result<String, PaymentError> {
    headers
        .get(STUDENT_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| validation("missing authenticated caller identity"))
}

pub fn is_admin(headers: &HeaderMap, expected_key: &str) -> bool {
    headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|provided| !expected_key.is_empty() && provided == expected_key)
}

/// Route-level guard for the admin/finance surface (refunds, audit queries).
pub async fn require_internal_api_key(
    State(expected): State<String>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_admin(request.headers(), &expected) {
        return Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .body(Body::from("unauthorized"))
            .unwrap_or_else(|_| Response::new(Body::from("unauthorized")));
    }

    next.run(request).await
}
