use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use crate::domain::transaction::{Transaction, TransactionStatus};

#[derive(Clone)]
pub struct TransactionsRepo {
    pub pool: PgPool,
}

pub struct NewTransaction {
    pub transaction_id: Uuid,
    pub student_id: String,
    pub course_id: String,
    pub session_id: String,
    pub original_amount: f64,
    pub discount_amount: f64,
    pub discount_code: Option<String>,
    pub discount_percentage: Option<f64>,
    pub final_amount: f64,
    pub gst_amount: f64,
    pub retried_from: Option<Uuid>,
}

fn map_row(row: sqlx::postgres::PgRow) -> Transaction {
    let status: String = row.get("status");
    Transaction {
        transaction_id: row.get("transaction_id"),
        student_id: row.get("student_id"),
        course_id: row.get("course_id"),
        session_id: row.get("session_id"),
        original_amount: row.get("original_amount"),
        discount_amount: row.get("discount_amount"),
        discount_code: row.get("discount_code"),
        discount_percentage: row.get("discount_percentage"),
        final_amount: row.get("final_amount"),
        gst_amount: row.get("gst_amount"),
        currency: row.get("currency"),
        status: TransactionStatus::parse(&status).unwrap_or(TransactionStatus::Failed),
        gateway_transaction_id: row.get("gateway_transaction_id"),
        error_code: row.get("error_code"),
        error_category: row.get("error_category"),
        error_message: row.get("error_message"),
        retry_count: row.get("retry_count"),
        last_retry_at: row.get("last_retry_at"),
        retried_from: row.get("retried_from"),
        refund_amount: row.get("refund_amount"),
        refund_reason: row.get("refund_reason"),
        refunded_at: row.get("refunded_at"),
        initiated_at: row.get("initiated_at"),
        completed_at: row.get("completed_at"),
        version: row.get("version"),
    }
}

const SELECT_COLUMNS: &str = r#"
    transaction_id, student_id, course_id, session_id, original_amount, discount_amount,
    discount_code, discount_percentage, final_amount, gst_amount, currency, status,
    gateway_transaction_id, error_code, error_category, error_message, retry_count,
    last_retry_at, retried_from, refund_amount, refund_reason, refunded_at,
    initiated_at, completed_at, version
"#;

impl TransactionsRepo {
    pub async fn insert(&self, data: &NewTransaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                transaction_id, student_id, course_id, session_id, original_amount,
                discount_amount, discount_code, discount_percentage, final_amount,
                gst_amount, retried_from
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            "#,
        )
        .bind(data.transaction_id)
        .bind(&data.student_id)
        .bind(&data.course_id)
        .bind(&data.session_id)
        .bind(data.original_amount)
        .bind(data.discount_amount)
        .bind(&data.discount_code)
        .bind(data.discount_percentage)
        .bind(data.final_amount)
        .bind(data.gst_amount)
        .bind(data.retried_from)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, transaction_id: Uuid) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(map_row))
    }

    pub async fn set_gateway_order(&self, transaction_id: Uuid, gateway_order_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE transactions SET gateway_transaction_id = $2 WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .bind(gateway_order_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_by_student(
        &self,
        student_id: &str,
        page: i64,
        per_page: i64,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>> {
        let offset = (page.max(1) - 1) * per_page;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM transactions
            WHERE student_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY initiated_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(student_id)
        .bind(status.map(|s| s.as_str()))
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_row).collect())
    }

    /// Conditional success write inside an open DB transaction, so enrollment
    /// activation commits or rolls back with it. `completed_at` is only ever
    /// written by this statement, exactly once.
    pub async fn cas_mark_success_tx(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        transaction_id: Uuid,
        expected_version: i32,
        gateway_transaction_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'SUCCESS', gateway_transaction_id = $3,
                completed_at = now(), version = version + 1
            WHERE transaction_id = $1 AND version = $2 AND status = 'PENDING'
            "#,
        )
        .bind(transaction_id)
        .bind(expected_version)
        .bind(gateway_transaction_id)
        .execute(tx.as_mut())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn cas_mark_failed(
        &self,
        transaction_id: Uuid,
        expected_version: i32,
        status: TransactionStatus,
        error_code: Option<&str>,
        error_category: &str,
        error_message: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $3, error_code = $4, error_category = $5, error_message = $6,
                version = version + 1
            WHERE transaction_id = $1 AND version = $2 AND status = 'PENDING'
            "#,
        )
        .bind(transaction_id)
        .bind(expected_version)
        .bind(status.as_str())
        .bind(error_code)
        .bind(error_category)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn cas_apply_refund(
        &self,
        transaction_id: Uuid,
        expected_version: i32,
        new_status: TransactionStatus,
        refund_total: f64,
        reason: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $3, refund_amount = $4, refund_reason = $5,
                refunded_at = now(), version = version + 1
            WHERE transaction_id = $1 AND version = $2
              AND status IN ('SUCCESS', 'PARTIAL_REFUND')
            "#,
        )
        .bind(transaction_id)
        .bind(expected_version)
        .bind(new_status.as_str())
        .bind(refund_total)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Restores the pre-refund bookkeeping when the provider call fails after
    /// the local reservation committed. Conditional on the version that
    /// reservation wrote.
    pub async fn cas_restore_refund_state(
        &self,
        transaction_id: Uuid,
        expected_version: i32,
        previous: &Transaction,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $3, refund_amount = $4, refund_reason = $5, refunded_at = $6,
                version = version + 1
            WHERE transaction_id = $1 AND version = $2
            "#,
        )
        .bind(transaction_id)
        .bind(expected_version)
        .bind(previous.status.as_str())
        .bind(previous.refund_amount)
        .bind(&previous.refund_reason)
        .bind(previous.refunded_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn bump_retry(&self, transaction_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET retry_count = retry_count + 1, last_retry_at = now()
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM transactions
            WHERE initiated_at >= $1 AND initiated_at < $2
            ORDER BY initiated_at ASC
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_row).collect())
    }

    /// (total, success) counts since the cutoff, for the rolling success rate.
    pub async fn outcome_counts_since(&self, since: DateTime<Utc>) -> Result<(i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT count(*) AS total,
                   count(*) FILTER (WHERE status = 'SUCCESS') AS succeeded
            FROM transactions
            WHERE initiated_at >= $1 AND status <> 'PENDING'
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.get::<i64, _>("total"), row.get::<i64, _>("succeeded")))
    }
}
