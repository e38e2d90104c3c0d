use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::gateways::{
    GatewayHealth, IntentRequest, LedgerEntry, PaymentGateway, PaymentIntent, RefundOutcome,
    RemoteStatus,
};

type HmacSha256 = Hmac<Sha256>;

pub struct RazorpayGateway {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl RazorpayGateway {
    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    async fn post_json(&self, url: String, body: serde_json::Value) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .timeout(self.timeout())
            .send()
            .await?;

        let status = resp.status();
        let value: serde_json::Value = resp.json().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!(
                "gateway returned HTTP_{}: {}",
                status.as_u16(),
                value
                    .pointer("/error/code")
                    .and_then(|c| c.as_str())
                    .unwrap_or("UNKNOWN")
            );
        }
        Ok(value)
    }

    async fn get_json(&self, url: String) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(self.timeout())
            .send()
            .await?;

        let status = resp.status();
        let value: serde_json::Value = resp.json().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("gateway returned HTTP_{}", status.as_u16());
        }
        Ok(value)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for RazorpayGateway {
    fn name(&self) -> &'static str {
        "razorpay"
    }

    async fn create_payment_request(&self, req: &IntentRequest) -> Result<PaymentIntent> {
        let body = json!({
            "amount": req.amount_minor,
            "currency": req.currency,
            "reference_id": req.transaction_id.to_string(),
            "description": format!("course {}", req.course_id),
            "notes": { "transaction_id": req.transaction_id.to_string() }
        });
        let v = self
            .post_json(format!("{}/v1/payment_links", self.base_url), body)
            .await?;

        Ok(PaymentIntent {
            gateway_order_id: v
                .get("id")
                .and_then(|id| id.as_str())
                .context("payment link response missing id")?
                .to_string(),
            payment_url: v.get("short_url").and_then(|u| u.as_str()).map(str::to_string),
            client_secret: None,
        })
    }

    async fn create_payment_intent(&self, req: &IntentRequest) -> Result<PaymentIntent> {
        let body = json!({
            "amount": req.amount_minor,
            "currency": req.currency,
            "receipt": req.transaction_id.to_string(),
            "payment_capture": 1,
            "notes": { "transaction_id": req.transaction_id.to_string() }
        });
        let v = self.post_json(format!("{}/v1/orders", self.base_url), body).await?;
        let order_id = v
            .get("id")
            .and_then(|id| id.as_str())
            .context("order response missing id")?
            .to_string();

        Ok(PaymentIntent {
            client_secret: Some(order_id.clone()),
            gateway_order_id: order_id,
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
        let order = self
            .get_json(format!("{}/v1/orders/{}", self.base_url, gateway_order_id))
            .await?;

        if order.get("status").and_then(|s| s.as_str()) == Some("paid") {
            return Ok(RemoteStatus::Captured {
                amount_minor: order.get("amount_paid").and_then(|a| a.as_i64()).unwrap_or(0),
            });
        }

        let payments = self
            .get_json(format!("{}/v1/orders/{}/payments", self.base_url, gateway_order_id))
            .await?;
        let failed_code = payments
            .pointer("/items")
            .and_then(|items| items.as_array())
            .and_then(|items| {
                items
                    .iter()
                    .find(|p| p.get("status").and_then(|s| s.as_str()) == Some("failed"))
            })
            .and_then(|p| p.get("error_code").and_then(|c| c.as_str()));

        match failed_code {
            Some(code) => Ok(RemoteStatus::Failed {
                error_code: code.to_string(),
            }),
            None => Ok(RemoteStatus::Pending),
        }
    }

    async fn initiate_refund(
        &self,
        gateway_transaction_id: &str,
        amount_minor: i64,
    ) -> Result<RefundOutcome> {
        let v = self
            .post_json(
                format!("{}/v1/payments/{}/refund", self.base_url, gateway_transaction_id),
                json!({ "amount": amount_minor }),
            )
            .await?;

        Ok(RefundOutcome {
            gateway_refund_id: v
                .get("id")
                .and_then(|id| id.as_str())
                .context("refund response missing id")?
                .to_string(),
            amount_minor: v.get("amount").and_then(|a| a.as_i64()).unwrap_or(amount_minor),
        })
    }

    async fn fetch_ledger(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        let v = self
            .get_json(format!(
                "{}/v1/payments?from={}&to={}&count=100",
                self.base_url,
                from.timestamp(),
                to.timestamp()
            ))
            .await?;

        let items = v
            .pointer("/items")
            .and_then(|items| items.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(items
            .iter()
            .filter_map(|p| {
                let id = p.get("id")?.as_str()?.to_string();
                let reference = p
                    .pointer("/notes/transaction_id")
                    .and_then(|t| t.as_str())
                    .and_then(|t| Uuid::parse_str(t).ok());
                Some(LedgerEntry {
                    gateway_transaction_id: id,
                    reference,
                    amount_minor: p.get("amount").and_then(|a| a.as_i64()).unwrap_or(0),
                    captured: p.get("status").and_then(|s| s.as_str()) == Some("captured"),
                    settled_at: p
                        .get("created_at")
                        .and_then(|t| t.as_i64())
                        .and_then(|t| Utc.timestamp_opt(t, 0).single())
                        .unwrap_or_else(Utc::now),
                })
            })
            .collect())
    }

    async fn check_health(&self) -> GatewayHealth {
        let start = std::time::Instant::now();
        let reachable = self
            .client
            .get(format!("{}/v1/orders?count=1", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(self.timeout())
            .send()
            .await
            .map(|r| !r.status().is_server_error())
            .unwrap_or(false);

        GatewayHealth {
            reachable,
            latency_ms: start.elapsed().as_millis() as i64,
        }
    }
}
