use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::{validation, PaymentError};
use crate::http::middleware::auth;
use crate::service::payment_service::{InitiateResponse, StatusResponse};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub course_id: String,
    pub discount_code: Option<String>,
}

pub async fn initiate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InitiateRequest>,
) -> Result<Json<InitiateResponse>, PaymentError> {
    let caller = auth::caller_id(&headers)?;
    let resp = state
        .payment_service
        .initiate(&caller, &req.course_id, req.discount_code.as_deref())
        .await?;
    Ok(Json(resp))
}

pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, PaymentError> {
    let caller = auth::caller_id(&headers)?;
    let admin = auth::is_admin(&headers, &state.internal_api_key);
    let resp = state
        .payment_service
        .check_status(&caller, admin, transaction_id)
        .await?;
    Ok(Json(resp))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    pub status: Option<String>,
}

fn default_page() -> i64 {
    1
}

pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Transaction>>, PaymentError> {
    let caller = auth::caller_id(&headers)?;
    let status = query
        .status
        .as_deref()
        .map(|s| {
            TransactionStatus::parse(&s.to_uppercase())
                .ok_or_else(|| validation(format!("unknown status filter {s}")))
        })
        .transpose()?;
    let items = state.payment_service.history(&caller, query.page, status).await?;
    Ok(Json(items))
}

pub async fn retry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<InitiateResponse>, PaymentError> {
    let caller = auth::caller_id(&headers)?;
    let resp = state.payment_service.retry(&caller, transaction_id).await?;
    Ok(Json(resp))
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub amount: f64,
    pub reason: String,
}

/// Admin/finance surface; the internal-api-key middleware sits in front.
pub async fn refund(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<Transaction>, PaymentError> {
    let txn = state
        .payment_service
        .refund(transaction_id, req.amount, &req.reason)
        .await?;
    Ok(Json(txn))
}

pub async fn notification_audit(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, PaymentError> {
    let entries = state
        .notification_log
        .list_for_transaction(transaction_id)
        .await?;
    Ok(Json(serde_json::json!({ "entries": entries })))
}
