//! In-memory gateway fake for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::OrderId;

use crate::adapter::{GatewayStatus, InitiateRequest, PaymentGateway, PaymentSession};
use crate::error::GatewayError;
use crate::Result;

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    sessions: HashMap<String, (OrderId, GatewayStatus)>,
    requests: Vec<InitiateRequest>,
    next_id: u32,
    fail_all: bool,
    fail_orders: HashSet<OrderId>,
}

/// In-memory payment gateway with scriptable failures.
///
/// Failures can be armed globally or per order, which is what the
/// partial-failure tests need (fail exactly one leg of a batch).
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline every initiation.
    pub fn set_fail_all(&self, fail: bool) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).fail_all = fail;
    }

    /// Configures the gateway to decline initiations for one order.
    pub fn set_fail_for(&self, order_id: OrderId) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).fail_orders.insert(order_id);
    }

    /// Returns the number of sessions opened so far.
    pub fn session_count(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).sessions.len()
    }

    /// The most recent initiation request seen, scripted failures
    /// included.
    pub fn last_request(&self) -> Option<InitiateRequest> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).requests.last().cloned()
    }

    /// Marks a session as paid (simulates the customer completing it).
    pub fn mark_paid(&self, external_ref: &str) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = state.sessions.get_mut(external_ref) {
            entry.1 = GatewayStatus::Paid;
        }
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn initiate(&self, request: InitiateRequest) -> Result<PaymentSession> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.requests.push(request.clone());

        if state.fail_all || state.fail_orders.contains(&request.order_id) {
            return Err(GatewayError::Declined("card declined".to_string()));
        }
        if !request.amount.is_positive() {
            return Err(GatewayError::InvalidRequest(format!(
                "non-positive amount {}",
                request.amount
            )));
        }

        state.next_id += 1;
        let external_ref = format!("SES-{:04}", state.next_id);
        let checkout_url = format!("https://pay.test/session/{external_ref}");
        state
            .sessions
            .insert(external_ref.clone(), (request.order_id, GatewayStatus::Pending));

        Ok(PaymentSession {
            checkout_url,
            external_ref,
        })
    }

    async fn status_of(&self, external_ref: &str) -> Result<GatewayStatus> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .sessions
            .get(external_ref)
            .map(|(_, status)| *status)
            .ok_or_else(|| GatewayError::UnknownReference(external_ref.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Currency, Money};

    fn request(order_id: OrderId, cents: i64) -> InitiateRequest {
        InitiateRequest::new(
            order_id,
            Money::from_cents(cents),
            Currency::usd(),
            "customer@example.com",
            "Order TS-0001",
        )
    }

    #[tokio::test]
    async fn test_initiate_returns_session() {
        let gateway = InMemoryGateway::new();
        let session = gateway.initiate(request(OrderId::new(), 1000)).await.unwrap();

        assert_eq!(session.external_ref, "SES-0001");
        assert!(session.checkout_url.contains("SES-0001"));
        assert_eq!(gateway.session_count(), 1);
    }

    #[tokio::test]
    async fn test_sequential_session_refs() {
        let gateway = InMemoryGateway::new();
        let s1 = gateway.initiate(request(OrderId::new(), 1000)).await.unwrap();
        let s2 = gateway.initiate(request(OrderId::new(), 2000)).await.unwrap();
        assert_eq!(s1.external_ref, "SES-0001");
        assert_eq!(s2.external_ref, "SES-0002");
    }

    #[tokio::test]
    async fn test_fail_all() {
        let gateway = InMemoryGateway::new();
        gateway.set_fail_all(true);

        let result = gateway.initiate(request(OrderId::new(), 1000)).await;
        assert!(matches!(result, Err(GatewayError::Declined(_))));
        assert_eq!(gateway.session_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_for_single_order() {
        let gateway = InMemoryGateway::new();
        let bad = OrderId::new();
        gateway.set_fail_for(bad);

        assert!(gateway.initiate(request(bad, 1000)).await.is_err());
        assert!(gateway.initiate(request(OrderId::new(), 1000)).await.is_ok());
        assert_eq!(gateway.session_count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amount() {
        let gateway = InMemoryGateway::new();
        let result = gateway.initiate(request(OrderId::new(), 0)).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_status_of_tracks_payment() {
        let gateway = InMemoryGateway::new();
        let session = gateway.initiate(request(OrderId::new(), 1000)).await.unwrap();

        assert_eq!(
            gateway.status_of(&session.external_ref).await.unwrap(),
            GatewayStatus::Pending
        );

        gateway.mark_paid(&session.external_ref);
        assert_eq!(
            gateway.status_of(&session.external_ref).await.unwrap(),
            GatewayStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_status_of_unknown_ref() {
        let gateway = InMemoryGateway::new();
        let result = gateway.status_of("SES-9999").await;
        assert!(matches!(result, Err(GatewayError::UnknownReference(_))));
    }
}
