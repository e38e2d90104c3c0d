use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

/// Closed error taxonomy. Everything crossing the service boundary is one of
/// these; repos and adapters stay on anyhow and get wrapped as `Internal`.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("payment gateway timed out")]
    GatewayTimeout,
    #[error("notification signature is invalid")]
    SignatureInvalid,
    #[error("payment session has expired")]
    Expired,
    #[error("transaction is not in a state that allows this operation")]
    InvalidState(String),
    #[error("concurrent update retries exhausted")]
    Conflict,
    #[error("caller is not permitted to perform this operation")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "VALIDATION",
            PaymentError::NotFound(_) => "NOT_FOUND",
            PaymentError::GatewayTimeout => "GATEWAY_TIMEOUT",
            PaymentError::SignatureInvalid => "SIGNATURE_INVALID",
            PaymentError::Expired => "EXPIRED",
            PaymentError::InvalidState(_) => "INVALID_STATE",
            PaymentError::Conflict => "CONFLICT",
            PaymentError::Forbidden => "FORBIDDEN",
            PaymentError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            PaymentError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            PaymentError::Expired => StatusCode::GONE,
            PaymentError::InvalidState(_) => StatusCode::CONFLICT,
            // 503 so the gateway's webhook retry policy re-delivers.
            PaymentError::Conflict => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::Forbidden => StatusCode::FORBIDDEN,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let details = match self {
            PaymentError::InvalidState(d) => Some(d.clone()),
            _ => None,
        };
        ErrorEnvelope {
            error: ErrorPayload {
                code: self.code().to_string(),
                message: self.to_string(),
                details,
            },
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        if let PaymentError::Internal(err) = &self {
            tracing::error!("internal error: {err:#}");
        }
        (self.status(), Json(self.envelope())).into_response()
    }
}

pub fn validation(msg: impl Into<String>) -> PaymentError {
    PaymentError::Validation(msg.into())
}

pub fn not_found(what: impl Into<String>) -> PaymentError {
    PaymentError::NotFound(what.into())
}
