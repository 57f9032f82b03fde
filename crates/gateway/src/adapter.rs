//! The provider-neutral gateway contract.

use std::collections::HashMap;

use async_trait::async_trait;
use common::{Currency, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Everything a provider needs to open a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateRequest {
    /// The order being paid for.
    pub order_id: OrderId,

    /// Amount to collect.
    pub amount: Money,

    /// Currency of the amount.
    pub currency: Currency,

    /// Customer contact handed to the provider (email or phone).
    pub customer_contact: String,

    /// Human-readable description shown on the provider's page.
    pub description: String,

    /// Opaque attribution/tracking metadata. Absence is normal.
    pub metadata: HashMap<String, String>,
}

impl InitiateRequest {
    /// Builds a request with empty metadata.
    pub fn new(
        order_id: OrderId,
        amount: Money,
        currency: Currency,
        customer_contact: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            amount,
            currency,
            customer_contact: customer_contact.into(),
            description: description.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A successfully opened checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    /// Where to send the customer.
    pub checkout_url: String,

    /// Provider-side reference for later status lookups.
    pub external_ref: String,
}

/// Provider-reported state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    /// Session open, customer has not completed payment.
    Pending,

    /// Payment collected.
    Paid,

    /// Payment rejected or session abandoned.
    Failed,

    /// Session expired at the provider.
    Expired,
}

/// Uniform interface over heterogeneous payment providers.
///
/// One adapter instance per provider; the orchestrator resolves the
/// right adapter through the registry. Every call is a blocking
/// outbound round trip from the caller's perspective.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a checkout session for one order.
    async fn initiate(&self, request: InitiateRequest) -> Result<PaymentSession>;

    /// Asks the provider for the current state of a session.
    ///
    /// Recovery path for when the change feed was down; routine status
    /// flow arrives asynchronously through the feed instead.
    async fn status_of(&self, external_ref: &str) -> Result<GatewayStatus>;
}
