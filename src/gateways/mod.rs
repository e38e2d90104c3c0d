use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod mock;
pub mod razorpay;

#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub transaction_id: Uuid,
    /// Total payable in minor units (paise).
    pub amount_minor: i64,
    pub currency: String,
    pub student_id: String,
    pub course_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub gateway_order_id: String,
    /// Hosted checkout URL (payment-request flow).
    pub payment_url: Option<String>,
    /// Client-side confirmation secret (intent flow).
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "state")]
pub enum RemoteStatus {
    Captured { amount_minor: i64 },
    Failed { error_code: String },
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub gateway_transaction_id: String,
    /// Our transaction id, carried as the order receipt/reference.
    pub reference: Option<Uuid>,
    pub amount_minor: i64,
    pub captured: bool,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub gateway_refund_id: String,
    pub amount_minor: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    pub reachable: bool,
    pub latency_ms: i64,
}

/// Everything the service needs from the external payment provider. One
/// implementation per provider plus a scriptable mock for tests.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Opens a hosted-checkout payment request and returns its URL.
    async fn create_payment_request(&self, req: &IntentRequest) -> Result<PaymentIntent>;

    /// Opens a client-confirmable intent and returns its secret.
    async fn create_payment_intent(&self, req: &IntentRequest) -> Result<PaymentIntent>;

    /// Constant-time HMAC check of a raw webhook body against its signature
    /// header. Never trusts any field inside the payload.
    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool;

    /// Authoritative current status of a payment attempt, used to re-verify
    /// advisory callbacks and for active status polling.
    async fn fetch_payment_status(&self, gateway_order_id: &str) -> Result<RemoteStatus>;

    async fn initiate_refund(
        &self,
        gateway_transaction_id: &str,
        amount_minor: i64,
    ) -> Result<RefundOutcome>;

    /// The provider's settled ledger for a window, used by reconciliation.
    async fn fetch_ledger(&self, from: DateTime<Utc>, to: DateTime<Utc>)
        -> Result<Vec<LedgerEntry>>;

    async fn check_health(&self) -> GatewayHealth;
}

pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub fn from_minor_units(amount_minor: i64) -> f64 {
    amount_minor as f64 / 100.0
}
