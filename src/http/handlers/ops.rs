use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::AppState;

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.monitoring.health().await;
    let ok = report.db_ok && report.redis_ok;
    let status = if ok {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "ready": ok,
            "db": report.db_ok,
            "redis": report.redis_ok,
            "gateway": report.gateway_ok,
        })),
    )
        .into_response()
}

pub async fn liveness() -> impl IntoResponse {
    (axum::http::StatusCode::OK, Json(serde_json::json!({"alive": true}))).into_response()
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitoring.health().await).into_response()
}
