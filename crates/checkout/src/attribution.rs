//! Session context lookups attached to gateway calls.
//!
//! Attribution (affiliate/tracking identifiers carried from the
//! originating cart) and customer contact are both optional lookups;
//! absence is normal and never blocks payment.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::CustomerId;

/// Affiliate/tracking context resolved once per batch and attached to
/// gateway calls as opaque metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    /// Affiliate identifier from the originating cart.
    pub affiliate_id: String,

    /// Optional campaign tag.
    pub campaign: Option<String>,
}

impl Attribution {
    /// Flattens the attribution into gateway metadata entries.
    pub fn metadata(&self) -> Vec<(String, String)> {
        let mut entries = vec![("affiliate_id".to_string(), self.affiliate_id.clone())];
        if let Some(campaign) = &self.campaign {
            entries.push(("campaign".to_string(), campaign.clone()));
        }
        entries
    }
}

/// Resolves the affiliate/tracking context for a customer's session.
#[async_trait]
pub trait AttributionResolver: Send + Sync {
    /// Returns the attribution for the customer, if any.
    async fn resolve(&self, customer_id: CustomerId) -> Option<Attribution>;
}

/// Resolves customer contact details handed to the payment provider.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Returns the customer's contact (email/phone), if known.
    async fn contact_for(&self, customer_id: CustomerId) -> Option<String>;
}

/// Resolver that never finds an attribution. Useful as the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAttribution;

#[async_trait]
impl AttributionResolver for NoAttribution {
    async fn resolve(&self, _customer_id: CustomerId) -> Option<Attribution> {
        None
    }
}

/// In-memory attribution resolver for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAttributionResolver {
    entries: Arc<RwLock<HashMap<CustomerId, Attribution>>>,
}

impl InMemoryAttributionResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an attribution for a customer.
    pub fn set(&self, customer_id: CustomerId, attribution: Attribution) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(customer_id, attribution);
    }
}

#[async_trait]
impl AttributionResolver for InMemoryAttributionResolver {
    async fn resolve(&self, customer_id: CustomerId) -> Option<Attribution> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&customer_id)
            .cloned()
    }
}

/// In-memory customer directory for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustomerDirectory {
    contacts: Arc<RwLock<HashMap<CustomerId, String>>>,
}

impl InMemoryCustomerDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a contact for a customer.
    pub fn set(&self, customer_id: CustomerId, contact: impl Into<String>) {
        self.contacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(customer_id, contact.into());
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn contact_for(&self, customer_id: CustomerId) -> Option<String> {
        self.contacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&customer_id)
            .cloned()
    }
}
