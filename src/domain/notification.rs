use serde::{Deserialize, Serialize};

use crate::domain::transaction::TransactionStatus;

/// Trust level of a payment notification. Webhooks are provider-signed and
/// authoritative; redirect callbacks are an unsigned latency hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSource {
    Authoritative,
    Advisory,
}

impl NotificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationSource::Authoritative => "webhook",
            NotificationSource::Advisory => "callback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedOutcome {
    Success,
    Failed,
}

impl ReportedOutcome {
    pub fn target_status(&self) -> TransactionStatus {
        match self {
            ReportedOutcome::Success => TransactionStatus::Success,
            ReportedOutcome::Failed => TransactionStatus::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ReconcileDecision {
    /// Perform the transition (and its side effects for success).
    Apply(TransactionStatus),
    /// Append to the audit log as processed, mutate nothing.
    RecordOnly(&'static str),
}

/// Single reconciliation rule for both channels. An Advisory event applies
/// only while no Authoritative event has been recorded, and the caller must
/// re-verify its claim against the gateway first. Terminal states are never
/// overridden, whatever the source.
pub fn reconcile(
    current: TransactionStatus,
    source: NotificationSource,
    outcome: ReportedOutcome,
    authoritative_seen: bool,
) -> ReconcileDecision {
    let target = outcome.target_status();

    if current.is_terminal() {
        return if current == target {
            ReconcileDecision::RecordOnly("duplicate notification of settled outcome")
        } else {
            ReconcileDecision::RecordOnly("conflicting notification after terminal state")
        };
    }

    match source {
        NotificationSource::Authoritative => ReconcileDecision::Apply(target),
        NotificationSource::Advisory => {
            if authoritative_seen {
                ReconcileDecision::RecordOnly("authoritative event already recorded")
            } else {
                ReconcileDecision::Apply(target)
            }
        }
    }
}
