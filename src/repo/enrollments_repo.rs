use anyhow::Result;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Clone)]
pub struct EnrollmentsRepo {
    pub pool: PgPool,
}

impl EnrollmentsRepo {
    /// Race-safe find-or-create, run inside the same DB transaction as the
    /// payment's success write. A pre-existing inactive enrollment is
    /// reactivated; a pre-existing active one is left untouched, so duplicate
    /// concurrent deliveries still end with exactly one enrollment.
    pub async fn activate_tx(
        tx: &mut Transaction<'_, Postgres>,
        student_id: &str,
        course_id: &str,
        transaction_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO enrollments (student_id, course_id, is_active, transaction_id)
            VALUES ($1, $2, true, $3)
            ON CONFLICT (student_id, course_id) DO UPDATE
                SET is_active = true,
                    reactivated_at = CASE WHEN enrollments.is_active THEN enrollments.reactivated_at ELSE now() END,
                    transaction_id = EXCLUDED.transaction_id
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .bind(transaction_id)
        .execute(tx.as_mut())
        .await?;

        sqlx::query(
            r#"
            INSERT INTO course_progress (student_id, course_id)
            VALUES ($1, $2)
            ON CONFLICT (student_id, course_id) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .execute(tx.as_mut())
        .await?;

        Ok(())
    }

    pub async fn link_organization_tx(
        tx: &mut Transaction<'_, Postgres>,
        organization_id: &str,
        student_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organization_members (organization_id, student_id)
            VALUES ($1, $2)
            ON CONFLICT (organization_id, student_id) DO NOTHING
            "#,
        )
        .bind(organization_id)
        .bind(student_id)
        .execute(tx.as_mut())
        .await?;

        Ok(())
    }

    pub async fn count_for_course(&self, student_id: &str, course_id: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT count(*) AS n FROM enrollments WHERE student_id = $1 AND course_id = $2 AND is_active",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("n"))
    }
}
