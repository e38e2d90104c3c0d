use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::session::{PaymentSession, SessionStatus};

#[derive(Clone)]
pub struct SessionsRepo {
    pub pool: PgPool,
}

fn map_row(row: sqlx::postgres::PgRow) -> PaymentSession {
    let status: String = row.get("status");
    PaymentSession {
        session_id: row.get("session_id"),
        transaction_id: row.get("transaction_id"),
        student_id: row.get("student_id"),
        course_id: row.get("course_id"),
        amount: row.get("amount"),
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Expired),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

const SELECT_COLUMNS: &str =
    "session_id, transaction_id, student_id, course_id, amount, status, created_at, expires_at";

impl SessionsRepo {
    pub async fn insert(&self, session: &PaymentSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_sessions
                (session_id, transaction_id, student_id, course_id, amount, status, created_at, expires_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.transaction_id)
        .bind(&session.student_id)
        .bind(&session.course_id)
        .bind(session.amount)
        .bind(session.status.as_str())
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<PaymentSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM payment_sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(map_row))
    }

    pub async fn get_by_transaction(&self, transaction_id: Uuid) -> Result<Option<PaymentSession>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM payment_sessions
            WHERE transaction_id = $1
            ORDER BY created_at DESC LIMIT 1
            "#
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(map_row))
    }

    /// Terminal transitions are conditional on the session still being active,
    /// which makes re-invocation on an already-terminal session a no-op.
    pub async fn mark_terminal(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        sqlx::query(
            "UPDATE payment_sessions SET status = $2 WHERE session_id = $1 AND status = 'ACTIVE'",
        )
        .bind(session_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Active sessions whose TTL elapsed without any notification. The sweep
    /// fails their transactions.
    pub async fn overdue_active(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<PaymentSession>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM payment_sessions
            WHERE status = 'ACTIVE' AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_row).collect())
    }

    /// Physical removal of sessions long past their expiry window. The
    /// transaction row is the durable record; sessions are disposable.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM payment_sessions WHERE status <> 'ACTIVE' AND expires_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
