//! Payment-gateway transaction records.

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, TransactionId};
use serde::{Deserialize, Serialize};

/// How long a gateway checkout session stays reusable after creation.
///
/// Providers expire hosted checkout pages; past this window a fresh
/// session is initiated instead of handing the customer a dead URL.
pub const SESSION_VALIDITY: Duration = Duration::minutes(30);

/// Lifecycle of a single payment-collection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Session created at the provider, customer has not paid yet.
    #[default]
    Initiated,

    /// Provider confirmed payment.
    Paid,

    /// Provider rejected or the customer abandoned the session.
    Failed,

    /// Session outlived its validity window or was superseded.
    Expired,
}

impl TransactionStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Expired => "expired",
        }
    }

    /// Parses a status from its string form.
    pub fn parse(s: &str) -> Option<TransactionStatus> {
        match s {
            "initiated" => Some(TransactionStatus::Initiated),
            "paid" => Some(TransactionStatus::Paid),
            "failed" => Some(TransactionStatus::Failed),
            "expired" => Some(TransactionStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A record of one attempt to collect payment for an order.
///
/// Transactions are never deleted (audit trail); a superseded session
/// is marked [`TransactionStatus::Expired`] when a fresh one is
/// created. An order has at most one usable transaction at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque identity.
    pub id: TransactionId,

    /// The order this transaction collects payment for.
    pub order_id: OrderId,

    /// Gateway provider identifier (e.g. `"stripe"`).
    pub provider: String,

    /// Hosted checkout URL the customer is sent to.
    pub checkout_url: String,

    /// Provider-side reference for this session.
    pub external_ref: String,

    /// Current session status.
    pub status: TransactionStatus,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a freshly initiated transaction.
    pub fn new(
        order_id: OrderId,
        provider: impl Into<String>,
        checkout_url: impl Into<String>,
        external_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            order_id,
            provider: provider.into(),
            checkout_url: checkout_url.into(),
            external_ref: external_ref.into(),
            status: TransactionStatus::Initiated,
            created_at: Utc::now(),
        }
    }

    /// Returns true if this session can still be handed to the customer
    /// at time `now`: initiated, not expired, and carrying a URL.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Initiated
            && !self.checkout_url.is_empty()
            && now - self.created_at < SESSION_VALIDITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction::new(
            OrderId::new(),
            "stripe",
            "https://pay.example/session/abc",
            "cs_abc",
        )
    }

    #[test]
    fn test_fresh_transaction_is_usable() {
        let tx = sample_tx();
        assert!(tx.is_usable(Utc::now()));
    }

    #[test]
    fn test_expired_window_is_not_usable() {
        let tx = sample_tx();
        let later = tx.created_at + SESSION_VALIDITY + Duration::seconds(1);
        assert!(!tx.is_usable(later));
    }

    #[test]
    fn test_terminal_statuses_are_not_usable() {
        for status in [
            TransactionStatus::Paid,
            TransactionStatus::Failed,
            TransactionStatus::Expired,
        ] {
            let mut tx = sample_tx();
            tx.status = status;
            assert!(!tx.is_usable(Utc::now()), "{status} should not be usable");
        }
    }

    #[test]
    fn test_missing_url_is_not_usable() {
        let mut tx = sample_tx();
        tx.checkout_url.clear();
        assert!(!tx.is_usable(Utc::now()));
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            TransactionStatus::Initiated,
            TransactionStatus::Paid,
            TransactionStatus::Failed,
            TransactionStatus::Expired,
        ] {
            assert_eq!(TransactionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TransactionStatus::parse("unknown"), None);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let tx = sample_tx();
        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, back);
    }
}
