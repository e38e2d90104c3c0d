use anyhow::Result;
use sqlx::{PgPool, Row};

/// Read-only lookups against catalog entities owned by other services
/// (courses, users, discount codes). Payment flows only ever read these.
#[derive(Clone)]
pub struct CatalogRepo {
    pub pool: PgPool,
}

#[derive(Debug, Clone)]
pub struct CourseRecord {
    pub course_id: String,
    pub title: String,
    pub price: f64,
    pub instructor_id: String,
    pub organization_id: Option<String>,
    pub is_published: bool,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct DiscountRecord {
    pub code: String,
    pub percentage: Option<f64>,
    pub fixed_amount: Option<f64>,
}

impl CatalogRepo {
    pub async fn get_course(&self, course_id: &str) -> Result<Option<CourseRecord>> {
        let row = sqlx::query(
            "SELECT course_id, title, price, instructor_id, organization_id, is_published FROM courses WHERE course_id = $1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| CourseRecord {
            course_id: r.get("course_id"),
            title: r.get("title"),
            price: r.get("price"),
            instructor_id: r.get("instructor_id"),
            organization_id: r.get("organization_id"),
            is_published: r.get("is_published"),
        }))
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT user_id, email, display_name, is_admin FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserRecord {
            user_id: r.get("user_id"),
            email: r.get("email"),
            display_name: r.get("display_name"),
            is_admin: r.get("is_admin"),
        }))
    }

    /// Only enabled, unexpired codes are returned.
    pub async fn get_discount(&self, code: &str) -> Result<Option<DiscountRecord>> {
        let row = sqlx::query(
            r#"
            SELECT code, percentage, fixed_amount
            FROM discount_codes
            WHERE code = $1 AND is_enabled
              AND (valid_until IS NULL OR valid_until > now())
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DiscountRecord {
            code: r.get("code"),
            percentage: r.get("percentage"),
            fixed_amount: r.get("fixed_amount"),
        }))
    }
}
