use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct ReconciliationRepo {
    pub pool: PgPool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ReconciliationSummary {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub matched: i32,
    pub discrepancies: i32,
    pub unmatched_local: i32,
    pub unmatched_remote: i32,
}

impl ReconciliationRepo {
    /// Upsert keyed by window so a re-run for the same range replaces rather
    /// than duplicates.
    pub async fn upsert(
        &self,
        summary: &ReconciliationSummary,
        details: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_reports
                (window_start, window_end, matched, discrepancies, unmatched_local, unmatched_remote, details, generated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,now())
            ON CONFLICT (window_start, window_end) DO UPDATE SET
                matched = EXCLUDED.matched,
                discrepancies = EXCLUDED.discrepancies,
                unmatched_local = EXCLUDED.unmatched_local,
                unmatched_remote = EXCLUDED.unmatched_remote,
                details = EXCLUDED.details,
                generated_at = now()
            "#,
        )
        .bind(summary.window_start)
        .bind(summary.window_end)
        .bind(summary.matched)
        .bind(summary.discrepancies)
        .bind(summary.unmatched_local)
        .bind(summary.unmatched_remote)
        .bind(details)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Option<ReconciliationSummary>> {
        let row = sqlx::query(
            r#"
            SELECT window_start, window_end, matched, discrepancies, unmatched_local, unmatched_remote
            FROM reconciliation_reports
            WHERE window_start = $1 AND window_end = $2
            "#,
        )
        .bind(window_start)
        .bind(window_end)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ReconciliationSummary {
            window_start: r.get("window_start"),
            window_end: r.get("window_end"),
            matched: r.get("matched"),
            discrepancies: r.get("discrepancies"),
            unmatched_local: r.get("unmatched_local"),
            unmatched_remote: r.get("unmatched_remote"),
        }))
    }
}
