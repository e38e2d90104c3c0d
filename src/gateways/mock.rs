use anyhow::Result;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::gateways::{
    GatewayHealth, IntentRequest, LedgerEntry, PaymentGateway, PaymentIntent, RefundOutcome,
    RemoteStatus,
};

type HmacSha256 = Hmac<Sha256>;

/// In-memory gateway with scriptable remote state, used by tests and local
/// development.
pub struct MockGateway {
    pub webhook_secret: String,
    counter: AtomicU64,
    statuses: Mutex<HashMap<String, RemoteStatus>>,
    ledger: Mutex<Vec<LedgerEntry>>,
}

impl MockGateway {
    pub fn new(webhook_secret: &str) -> Self {
        Self {
            webhook_secret: webhook_secret.to_string(),
            counter: AtomicU64::new(0),
            statuses: Mutex::new(HashMap::new()),
            ledger: Mutex::new(Vec::new()),
        }
    }

    pub fn script_status(&self, gateway_order_id: &str, status: RemoteStatus) {
        self.statuses
            .lock()
            .expect("mock statuses lock")
            .insert(gateway_order_id.to_string(), status);
    }

    pub fn script_ledger(&self, entries: Vec<LedgerEntry>) {
        *self.ledger.lock().expect("mock ledger lock") = entries;
    }

    pub fn sign(&self, raw_body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(raw_body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{:06}", self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_payment_request(&self, req: &IntentRequest) -> Result<PaymentIntent> {
        let id = self.next_id("plink");
        Ok(PaymentIntent {
            payment_url: Some(format!("https://mock.gateway/pay/{id}/{}", req.transaction_id)),
            gateway_order_id: id,
            client_secret: None,
        })
    }

    async fn create_payment_intent(&self, _req: &IntentRequest) -> Result<PaymentIntent> {
        let id = self.next_id("order");
        Ok(PaymentIntent {
            client_secret: Some(format!("secret_{id}")),
            gateway_order_id: id,
            payment_url: None,
        })
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.webhook_secret.as_bytes()) else {
            return false;
        };
        mac.update(raw_body);
        mac.verify_slice(&expected).is_ok()
    }

    async fn fetch_payment_status(&self, gateway_order_id: &str) -> Result<RemoteStatus> {
        Ok(self
            .statuses
            .lock()
            .expect("mock statuses lock")
            .get(gateway_order_id)
            .cloned()
            .unwrap_or(RemoteStatus::Pending))
    }

    async fn initiate_refund(
        &self,
        _gateway_transaction_id: &str,
        amount_minor: i64,
    ) -> Result<RefundOutcome> {
        Ok(RefundOutcome {
            gateway_refund_id: self.next_id("rfnd"),
            amount_minor,
        })
    }

    async fn fetch_ledger(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .ledger
            .lock()
            .expect("mock ledger lock")
            .iter()
            .filter(|e| e.settled_at >= from && e.settled_at < to)
            .cloned()
            .collect())
    }

    async fn check_health(&self) -> GatewayHealth {
        GatewayHealth {
            reachable: true,
            latency_ms: 1,
        }
    }
}
