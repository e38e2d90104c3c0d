use anyhow::Result;
use std::sync::Mutex;

/// Delivery seam for the ops channel. Monitoring breaches, security events and
/// reconciliation reports all go through one of these.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert_type: &str, payload: serde_json::Value) -> Result<()>;
}

/// Best-effort webhook notifier.
pub struct AlertNotifier {
    pub client: reqwest::Client,
    pub ops_webhook_url: Option<String>,
}

#[async_trait::async_trait]
impl AlertSink for AlertNotifier {
    async fn send(&self, alert_type: &str, payload: serde_json::Value) -> Result<()> {
        tracing::warn!(alert_type, %payload, "alert raised");

        let Some(url) = &self.ops_webhook_url else {
            tracing::warn!("no ops webhook configured, alert logged only");
            return Ok(());
        };

        self.client
            .post(url)
            .header("X-Alert-Type", alert_type)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await?;

        Ok(())
    }
}

/// Capturing sink for tests and local runs without an ops channel.
#[derive(Default)]
pub struct MemorySink {
    sent: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<(String, serde_json::Value)> {
        std::mem::take(&mut *self.sent.lock().expect("memory sink lock"))
    }
}

#[async_trait::async_trait]
impl AlertSink for MemorySink {
    async fn send(&self, alert_type: &str, payload: serde_json::Value) -> Result<()> {
        self.sent
            .lock()
            .expect("memory sink lock")
            .push((alert_type.to_string(), payload));
        Ok(())
    }
}
