use chrono::Utc;
use uuid::Uuid;

use crate::domain::session::{
    check_session, new_session_id, session_expiry, PaymentSession, SessionCheck, SessionStatus,
};
use crate::error::{not_found, validation, PaymentError};
use crate::repo::sessions_repo::SessionsRepo;

/// The session, not the transaction, answers "is this attempt still open".
#[derive(Clone)]
pub struct SessionManager {
    pub repo: SessionsRepo,
}

impl SessionManager {
    pub async fn create(
        &self,
        transaction_id: Uuid,
        student_id: &str,
        course_id: &str,
        amount: f64,
    ) -> Result<PaymentSession, PaymentError> {
        if student_id.is_empty() || course_id.is_empty() {
            return Err(validation("session requires student and course"));
        }

        let now = Utc::now();
        let session = PaymentSession {
            session_id: new_session_id(),
            transaction_id,
            student_id: student_id.to_string(),
            course_id: course_id.to_string(),
            amount,
            status: SessionStatus::Active,
            created_at: now,
            expires_at: session_expiry(now),
        };
        self.repo.insert(&session).await?;
        Ok(session)
    }

    /// Lazy expiry: an active session found past its deadline is flipped to
    /// EXPIRED as a side effect of validation.
    pub async fn validate(&self, session_id: &str) -> Result<PaymentSession, PaymentError> {
        let session = self
            .repo
            .get(session_id)
            .await?
            .ok_or_else(|| not_found("payment session"))?;

        match check_session(&session, Utc::now()) {
            SessionCheck::Usable => Ok(session),
            SessionCheck::Closed(status) => Err(PaymentError::InvalidState(format!(
                "session is {}",
                status.as_str()
            ))),
            SessionCheck::Overdue => {
                self.repo.mark_terminal(session_id, SessionStatus::Expired).await?;
                Err(PaymentError::Expired)
            }
        }
    }

    pub async fn complete(&self, session_id: &str) -> Result<(), PaymentError> {
        self.repo.mark_terminal(session_id, SessionStatus::Completed).await?;
        Ok(())
    }

    pub async fn cancel(&self, session_id: &str) -> Result<(), PaymentError> {
        self.repo.mark_terminal(session_id, SessionStatus::Cancelled).await?;
        Ok(())
    }

    pub async fn expire(&self, session_id: &str) -> Result<(), PaymentError> {
        self.repo.mark_terminal(session_id, SessionStatus::Expired).await?;
        Ok(())
    }
}
