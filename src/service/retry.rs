use std::future::Future;
use std::time::Duration;

use crate::error::PaymentError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

pub enum CasAttempt<T> {
    /// The conditional write landed.
    Applied(T),
    /// Someone else moved the row; re-read and try again.
    Conflict,
}

/// Runs a compare-and-set operation under a bounded backoff schedule.
/// Exhaustion surfaces as `Conflict`.
pub async fn with_cas_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, PaymentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<CasAttempt<T>, PaymentError>>,
{
    for attempt in 0..policy.max_attempts {
        match op().await? {
            CasAttempt::Applied(value) => return Ok(value),
            CasAttempt::Conflict => {
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.backoff(attempt)).await;
                }
            }
        }
    }

    Err(PaymentError::Conflict)
}
