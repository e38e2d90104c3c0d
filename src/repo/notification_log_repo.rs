use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::notification::NotificationSource;

#[derive(Clone)]
pub struct NotificationLogRepo {
    pub pool: PgPool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NotificationLogEntry {
    pub id: i64,
    pub transaction_id: Uuid,
    pub source: String,
    pub payload: serde_json::Value,
    pub signature_valid: Option<bool>,
    pub processed: bool,
    pub outcome: Option<String>,
    pub received_at: chrono::DateTime<chrono::Utc>,
}

impl NotificationLogRepo {
    /// Append-only; entries are never updated or deleted by the service.
    pub async fn append(
        &self,
        transaction_id: Uuid,
        source: NotificationSource,
        payload: &serde_json::Value,
        signature_valid: Option<bool>,
        processed: bool,
        outcome: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_log
                (transaction_id, source, payload, signature_valid, processed, outcome)
            VALUES ($1,$2,$3,$4,$5,$6)
            "#,
        )
        .bind(transaction_id)
        .bind(source.as_str())
        .bind(payload)
        .bind(signature_valid)
        .bind(processed)
        .bind(outcome)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn has_authoritative(&self, transaction_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            "SELECT count(*) AS n FROM notification_log WHERE transaction_id = $1 AND source = 'webhook' AND signature_valid = true",
        )
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("n") > 0)
    }

    pub async fn list_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<NotificationLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, transaction_id, source, payload, signature_valid, processed, outcome, received_at
            FROM notification_log
            WHERE transaction_id = $1
            ORDER BY received_at ASC
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| NotificationLogEntry {
                id: row.get("id"),
                transaction_id: row.get("transaction_id"),
                source: row.get("source"),
                payload: row.get("payload"),
                signature_valid: row.get("signature_valid"),
                processed: row.get("processed"),
                outcome: row.get("outcome"),
                received_at: row.get("received_at"),
            })
            .collect())
    }
}
