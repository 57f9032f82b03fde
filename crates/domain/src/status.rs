//! Payment status state machine.

use serde::{Deserialize, Serialize};

/// The payment status of an order.
///
/// Transitions only flow forward:
/// ```text
/// Pending ──► Processing ──► Completed
///    │            │
///    └────────────┴──► Failed
/// ```
///
/// `Completed` and `Failed` are terminal: once reached, no further
/// transition is accepted. Asynchronous status events arrive at least
/// once and possibly out of order, so the forward-only rule is what
/// keeps duplicates and stale deliveries from regressing an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Order created, no payment confirmed yet.
    #[default]
    Pending,

    /// A gateway session is underway, awaiting provider confirmation.
    Processing,

    /// Payment confirmed by the provider (terminal state).
    Completed,

    /// Payment rejected or abandoned (terminal state).
    Failed,
}

impl PaymentStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }

    /// Returns true if payment can still be initiated in this state.
    pub fn is_payable(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }

    /// Position of this status along the forward-only progression.
    fn rank(&self) -> u8 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::Processing => 1,
            PaymentStatus::Completed => 2,
            PaymentStatus::Failed => 2,
        }
    }

    /// Returns true if a transition from `self` to `next` moves forward.
    ///
    /// Re-asserting the current status or moving backward is not a valid
    /// transition; callers treat both as a no-op.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Parses a status from its string form.
    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "processing" => Some(PaymentStatus::Processing),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
