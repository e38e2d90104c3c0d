use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SESSION_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Expired,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Expired => "EXPIRED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(SessionStatus::Active),
            "COMPLETED" => Some(SessionStatus::Completed),
            "EXPIRED" => Some(SessionStatus::Expired),
            "CANCELLED" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    pub session_id: String,
    pub transaction_id: Uuid,
    pub student_id: String,
    pub course_id: String,
    pub amount: f64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PaymentSession {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    Usable,
    /// Already terminal; carries the stored status.
    Closed(SessionStatus),
    /// Still ACTIVE in storage but past its deadline; must be flipped to
    /// EXPIRED before the attempt is rejected.
    Overdue,
}

pub fn check_session(session: &PaymentSession, now: DateTime<Utc>) -> SessionCheck {
    if session.status != SessionStatus::Active {
        return SessionCheck::Closed(session.status);
    }
    if session.is_past_expiry(now) {
        return SessionCheck::Overdue;
    }
    SessionCheck::Usable
}

/// 128 bits from the OS CSPRNG, hex-encoded.
pub fn new_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("ps_{}", hex::encode(bytes))
}

pub fn session_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(SESSION_TTL_MINUTES)
}
