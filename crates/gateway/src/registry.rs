//! Provider registry: name → adapter.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::PaymentGateway;
use crate::error::GatewayError;
use crate::Result;

/// Maps provider identifiers to their adapters.
///
/// Built once at startup and shared read-only; each store's configured
/// provider name resolves to an adapter at payment time.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    providers: HashMap<String, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under a provider name.
    pub fn register(mut self, name: impl Into<String>, adapter: Arc<dyn PaymentGateway>) -> Self {
        self.providers.insert(name.into(), adapter);
        self
    }

    /// Resolves the adapter for a provider name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn PaymentGateway>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownProvider(name.to_string()))
    }

    /// Names of all registered providers.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}
