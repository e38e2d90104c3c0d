use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::error::PaymentError;
use crate::service::notification_processor::CallbackRequest;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Provider-pushed, signed, authoritative. Errors map to the taxonomy's HTTP
/// codes; CONFLICT exhaustion comes back 503 so the provider re-delivers.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, PaymentError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    let status = state.processor.handle_webhook(&body, signature).await?;
    Ok(Json(serde_json::json!({ "status": status })))
}

/// Browser-redirect channel. Best-effort: the claimed status is verified
/// against the gateway before anything is applied.
pub async fn callback(
    State(state): State<AppState>,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<serde_json::Value>, PaymentError> {
    let status = state.processor.handle_callback(req).await?;
    Ok(Json(serde_json::json!({ "status": status })))
}
