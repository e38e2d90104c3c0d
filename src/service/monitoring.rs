use anyhow::Result;
use chrono::{Duration, Utc};
use redis::AsyncCommands;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::repo::transactions_repo::TransactionsRepo;
use crate::service::alerts::AlertSink;

pub const SWEEP_INTERVAL_SECS: u64 = 300;
pub const SUCCESS_RATE_MIN: f64 = 0.90;
pub const LATENCY_MAX_MS: f64 = 5000.0;
pub const ALERT_COOLDOWN_SECS: u64 = 1800;
pub const LATENCY_SAMPLE_CAP: isize = 100;

const LATENCY_KEY: &str = "monitor:gateway_latency_ms";

/// Capped Redis list of the most recent gateway call latencies.
#[derive(Clone)]
pub struct LatencyStore {
    pub client: redis::Client,
}

impl LatencyStore {
    pub async fn record(&self, latency_ms: i64) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.lpush(LATENCY_KEY, latency_ms).await?;
        let _: () = conn.ltrim(LATENCY_KEY, 0, LATENCY_SAMPLE_CAP - 1).await?;
        Ok(())
    }

    pub async fn recent(&self) -> Result<Vec<i64>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let samples: Vec<i64> = conn.lrange(LATENCY_KEY, 0, LATENCY_SAMPLE_CAP - 1).await?;
        Ok(samples)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    LowSuccessRate,
    HighLatency,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::LowSuccessRate => "payment_success_rate_low",
            AlertKind::HighLatency => "gateway_latency_high",
        }
    }
}

pub fn moving_average(samples: &[i64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<i64>() as f64 / samples.len() as f64)
}

pub fn success_rate(total: i64, succeeded: i64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(succeeded as f64 / total as f64)
}

/// Threshold evaluation, separated out so it is testable without I/O. `None`
/// inputs (no data yet) never breach.
pub fn evaluate_thresholds(rate: Option<f64>, avg_latency_ms: Option<f64>) -> Vec<AlertKind> {
    let mut breaches = Vec::new();
    if rate.is_some_and(|r| r < SUCCESS_RATE_MIN) {
        breaches.push(AlertKind::LowSuccessRate);
    }
    if avg_latency_ms.is_some_and(|l| l > LATENCY_MAX_MS) {
        breaches.push(AlertKind::HighLatency);
    }
    breaches
}

/// Cooldown verdict from the `SET NX` result. Errors fail open: an unreachable
/// cooldown store must not silence monitoring.
pub fn should_send_alert(cooldown: redis::RedisResult<Option<String>>) -> bool {
    match cooldown {
        Ok(token) => token.is_some(),
        Err(err) => {
            tracing::error!("alert cooldown check failed, failing open: {err}");
            true
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub db_ok: bool,
    pub redis_ok: bool,
    /// Coarse heuristic from recent latency samples; true when we have no
    /// evidence of gateway trouble.
    pub gateway_ok: bool,
}

#[derive(Clone)]
pub struct MonitoringService {
    pub pool: PgPool,
    pub transactions_repo: TransactionsRepo,
    pub latency_store: LatencyStore,
    pub alerts: Arc<dyn AlertSink>,
    pub redis_client: redis::Client,
    running: Arc<AtomicBool>,
}

impl MonitoringService {
    pub fn new(
        pool: PgPool,
        transactions_repo: TransactionsRepo,
        latency_store: LatencyStore,
        alerts: Arc<dyn AlertSink>,
        redis_client: redis::Client,
    ) -> Self {
        Self {
            pool,
            transactions_repo,
            latency_store,
            alerts,
            redis_client,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(self) {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS)).await;
            if let Err(err) = self.tick().await {
                tracing::error!("monitoring sweep failed: {err:#}");
            }
        }
    }

    pub async fn tick(&self) -> Result<()> {
        // Overlapping sweeps are skipped, not queued.
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("monitoring sweep already running, skipping");
            return Ok(());
        }
        let result = self.sweep().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn sweep(&self) -> Result<()> {
        let since = Utc::now() - Duration::hours(24);
        let (total, succeeded) = self.transactions_repo.outcome_counts_since(since).await?;
        let rate = success_rate(total, succeeded);

        let samples = self.latency_store.recent().await.unwrap_or_default();
        let avg = moving_average(&samples);

        for kind in evaluate_thresholds(rate, avg) {
            let payload = serde_json::json!({
                "success_rate_24h": rate,
                "avg_latency_ms": avg,
                "settled_24h": total,
            });
            self.alert_with_cooldown(kind, payload).await?;
        }

        tracing::info!(?rate, ?avg, settled = total, "monitoring sweep complete");
        Ok(())
    }

    /// One alert per kind per cooldown window; a sustained outage does not
    /// page once per sweep.
    async fn alert_with_cooldown(&self, kind: AlertKind, payload: serde_json::Value) -> Result<()> {
        let key = format!("monitor:alert_cooldown:{}", kind.as_str());
        let cooldown: redis::RedisResult<Option<String>> = async {
            let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
            redis::cmd("SET")
                .arg(&key)
                .arg(Utc::now().timestamp())
                .arg("NX")
                .arg("EX")
                .arg(ALERT_COOLDOWN_SECS)
                .query_async(&mut conn)
                .await
        }
        .await;

        if !should_send_alert(cooldown) {
            tracing::debug!(kind = kind.as_str(), "alert suppressed by cooldown");
            return Ok(());
        }

        if let Err(err) = self.alerts.send(kind.as_str(), payload).await {
            tracing::error!("failed to deliver monitoring alert: {err:#}");
        }
        Ok(())
    }

    pub async fn health(&self) -> HealthReport {
        let db_ok = sqlx::query("SELECT 1").execute(&self.pool).await.is_ok();

        let redis_ok = async {
            if let Ok(mut conn) = self.redis_client.get_multiplexed_async_connection().await {
                let pong: redis::RedisResult<String> =
                    redis::cmd("PING").query_async(&mut conn).await;
                return pong.is_ok();
            }
            false
        }
        .await;

        let gateway_ok = match self.latency_store.recent().await {
            Ok(samples) => moving_average(&samples).map_or(true, |avg| avg <= LATENCY_MAX_MS),
            Err(_) => true,
        };

        HealthReport {
            db_ok,
            redis_ok,
            gateway_ok,
        }
    }
}
