use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;

use crate::service::alerts::AlertSink;

/// Persists security events and raises one admin alert per occurrence.
/// Invalid webhook signatures land here and are never applied as transitions.
#[derive(Clone)]
pub struct SecurityLog {
    pub pool: PgPool,
    pub alerts: Arc<dyn AlertSink>,
}

impl SecurityLog {
    /// The alert goes out even when the audit insert fails; losing the page is
    /// worse than losing the row.
    pub async fn record(&self, event_type: &str, detail: serde_json::Value) -> Result<()> {
        if let Err(err) =
            sqlx::query("INSERT INTO security_events (event_type, detail) VALUES ($1, $2)")
                .bind(event_type)
                .bind(&detail)
                .execute(&self.pool)
                .await
        {
            tracing::error!("failed to persist security event: {err}");
        }

        self.alerts.send(event_type, detail).await?;
        Ok(())
    }
}
