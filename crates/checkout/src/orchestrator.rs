//! Checkout orchestrator: idempotent single pay and bulk fan-out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use common::{CustomerId, OrderId};
use domain::{Order, Transaction};
use futures_util::future::join_all;
use gateway::{GatewayRegistry, InitiateRequest};
use store::{OrderRepository, StoreError, TransactionRepository};

use crate::attribution::{Attribution, AttributionResolver, CustomerDirectory};
use crate::error::CheckoutError;
use crate::Result;

/// Outcome of a bulk payment over one batch.
///
/// Partial success is a valid, expected terminal state; there is no
/// rollback. Callers navigate to [`first_checkout_url`] when at least
/// one initiation succeeded and retry the orders listed in
/// [`per_order_errors`] individually.
///
/// [`first_checkout_url`]: BatchResult::first_checkout_url
/// [`per_order_errors`]: BatchResult::per_order_errors
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Number of orders for which a checkout session is ready.
    pub succeeded: usize,

    /// Number of orders whose initiation failed.
    pub failed: usize,

    /// Checkout URL of the success with the lowest order id, for
    /// deterministic navigation. `None` when nothing succeeded.
    pub first_checkout_url: Option<String>,

    /// The failure for each order that did not get a session.
    pub per_order_errors: HashMap<OrderId, CheckoutError>,
}

impl BatchResult {
    /// Returns true if every processed order got a session.
    pub fn is_full_success(&self) -> bool {
        self.failed == 0
    }
}

/// Drives each order of a batch through an independent gateway session.
///
/// Not a distributed transaction: one order's failure never aborts or
/// delays its siblings, and nothing is rolled back. The orchestrator
/// never writes payment status; authoritative status flows back through
/// the change feed from the provider's callbacks.
#[derive(Clone)]
pub struct CheckoutOrchestrator<O, T, A, D> {
    orders: O,
    transactions: T,
    gateways: GatewayRegistry,
    provider: String,
    attribution: A,
    directory: D,
    /// Per-order initiation locks. Serializes concurrent `pay_order`
    /// calls for the same order so a race cannot mint two sessions.
    locks: Arc<Mutex<HashMap<OrderId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl<O, T, A, D> CheckoutOrchestrator<O, T, A, D>
where
    O: OrderRepository + Clone + Send + Sync + 'static,
    T: TransactionRepository + Clone + Send + Sync + 'static,
    A: AttributionResolver + Clone + Send + Sync + 'static,
    D: CustomerDirectory + Clone + Send + Sync + 'static,
{
    /// Creates a new orchestrator.
    pub fn new(
        orders: O,
        transactions: T,
        gateways: GatewayRegistry,
        provider: impl Into<String>,
        attribution: A,
        directory: D,
    ) -> Self {
        Self {
            orders,
            transactions,
            gateways,
            provider: provider.into(),
            attribution,
            directory,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn order_lock(&self, order_id: OrderId) -> Arc<tokio::sync::Mutex<()>> {
        // The registry holds unit mutexes only, so a poisoned guard
        // cannot expose inconsistent data.
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(order_id).or_default().clone()
    }

    /// Drops this caller's handle and evicts the registry entry once no
    /// other initiation holds one, so the map stays bounded by in-flight
    /// work instead of growing with every order ever paid.
    fn release_order_lock(&self, order_id: OrderId, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        drop(lock);
        if let Some(entry) = locks.get(&order_id)
            && Arc::strong_count(entry) == 1
        {
            locks.remove(&order_id);
        }
    }

    /// Initiates payment for a single order and returns the checkout
    /// URL to send the customer to.
    ///
    /// Idempotent per order id: an existing usable session is returned
    /// as-is. Ownership is re-verified against the repository before
    /// anything else, session reuse included, and never trusted from a
    /// cached view. On gateway failure nothing is persisted and the
    /// order's payment status is untouched.
    #[tracing::instrument(skip(self), fields(provider = %self.provider))]
    pub async fn pay_order(&self, caller: CustomerId, order_id: OrderId) -> Result<String> {
        let attribution = self.attribution.resolve(caller).await;
        self.pay_with_attribution(caller, order_id, attribution)
            .await
    }

    async fn pay_with_attribution(
        &self,
        caller: CustomerId,
        order_id: OrderId,
        attribution: Option<Attribution>,
    ) -> Result<String> {
        let lock = self.order_lock(order_id);
        let result = {
            let _guard = lock.lock().await;
            self.pay_locked(caller, order_id, attribution).await
        };
        self.release_order_lock(order_id, lock);
        result
    }

    async fn pay_locked(
        &self,
        caller: CustomerId,
        order_id: OrderId,
        attribution: Option<Attribution>,
    ) -> Result<String> {
        // Ownership gates everything below, the reuse branch included.
        // A bare order id must not yield another customer's checkout
        // URL.
        let owned = self.orders.get_by_ids(&[order_id], caller).await?;
        let order = owned
            .into_iter()
            .next()
            .ok_or(CheckoutError::Authorization {
                requested: 1,
                owned: 0,
            })?;

        // Idempotency guard: reuse an in-flight session instead of
        // minting a duplicate for the same order.
        if let Some(existing) = self.transactions.get_active_for_order(order_id).await?
            && existing.is_usable(Utc::now())
        {
            metrics::counter!("checkout_session_reused_total").increment(1);
            tracing::debug!(%order_id, "reusing existing checkout session");
            return Ok(existing.checkout_url);
        }

        if !order.is_payable() {
            return Err(CheckoutError::NotPayable {
                order_id,
                status: order.payment_status,
            });
        }

        let session = self.initiate_session(&order, caller, attribution).await?;

        let transaction = Transaction::new(
            order_id,
            self.provider.clone(),
            session.checkout_url.clone(),
            session.external_ref,
        );
        match self.transactions.create(transaction).await {
            Ok(_) => {
                metrics::counter!("checkout_initiations_total").increment(1);
                tracing::info!(%order_id, "checkout session created");
                Ok(session.checkout_url)
            }
            Err(StoreError::ConflictingTransaction { .. }) => {
                // A concurrent initiation won the race; its session is
                // just as good. Re-read and hand that one out.
                metrics::counter!("checkout_conflict_retries_total").increment(1);
                match self.transactions.get_active_for_order(order_id).await? {
                    Some(winner) => Ok(winner.checkout_url),
                    None => Err(CheckoutError::Conflict { order_id }),
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn initiate_session(
        &self,
        order: &Order,
        caller: CustomerId,
        attribution: Option<Attribution>,
    ) -> Result<gateway::PaymentSession> {
        let adapter = self.gateways.get(&self.provider)?;
        let contact = self
            .directory
            .contact_for(caller)
            .await
            .unwrap_or_else(|| caller.to_string());

        let mut request = InitiateRequest::new(
            order.id,
            order.amount,
            order.currency.clone(),
            contact,
            format!("Order {} at {}", order.order_number, order.store_name),
        );
        if let Some(attribution) = attribution {
            for (key, value) in attribution.metadata() {
                request = request.with_metadata(key, value);
            }
        }

        Ok(adapter.initiate(request).await?)
    }

    /// Initiates payment for every still-payable order in the batch,
    /// concurrently and independently.
    ///
    /// Orders that are not pending/processing are skipped untouched.
    /// Each leg runs on a detached task, so an in-flight gateway call
    /// finishes even if the caller's future is dropped; one leg's
    /// failure never aborts or delays the others.
    #[tracing::instrument(skip(self, orders), fields(batch_size = orders.len()))]
    pub async fn pay_all_pending(&self, caller: CustomerId, orders: &[Order]) -> BatchResult {
        let start = std::time::Instant::now();
        let attribution = self.attribution.resolve(caller).await;

        let mut handles = Vec::new();
        for order in orders.iter().filter(|o| o.is_payable()) {
            let this = self.clone();
            let order_id = order.id;
            let attribution = attribution.clone();
            let handle = tokio::spawn(async move {
                this.pay_with_attribution(caller, order_id, attribution)
                    .await
            });
            handles.push((order_id, handle));
        }

        let mut result = BatchResult::default();
        let mut successes: Vec<(OrderId, String)> = Vec::new();

        let joined = join_all(handles.into_iter().map(|(id, handle)| async move {
            (id, handle.await)
        }))
        .await;

        for (order_id, outcome) in joined {
            match outcome {
                Ok(Ok(url)) => {
                    result.succeeded += 1;
                    successes.push((order_id, url));
                }
                Ok(Err(err)) => {
                    tracing::warn!(%order_id, error = %err, "payment initiation failed");
                    result.failed += 1;
                    result.per_order_errors.insert(order_id, err);
                }
                Err(join_err) => {
                    tracing::error!(%order_id, error = %join_err, "payment task failed");
                    result.failed += 1;
                    result
                        .per_order_errors
                        .insert(order_id, CheckoutError::Task(join_err.to_string()));
                }
            }
        }

        result.first_checkout_url = successes
            .into_iter()
            .min_by_key(|(id, _)| *id)
            .map(|(_, url)| url);

        metrics::histogram!("checkout_batch_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        tracing::info!(
            succeeded = result.succeeded,
            failed = result.failed,
            "bulk payment finished"
        );

        result
    }

    /// Asks the provider directly for the state of the order's current
    /// session.
    ///
    /// Recovery path for when the change feed was down; routine status
    /// updates arrive through the feed. Reads only, never writes status.
    #[tracing::instrument(skip(self), fields(provider = %self.provider))]
    pub async fn recheck_session(
        &self,
        caller: CustomerId,
        order_id: OrderId,
    ) -> Result<Option<gateway::GatewayStatus>> {
        let owned = self.orders.get_by_ids(&[order_id], caller).await?;
        if owned.is_empty() {
            return Err(CheckoutError::Authorization {
                requested: 1,
                owned: 0,
            });
        }

        match self.transactions.get_active_for_order(order_id).await? {
            Some(transaction) => {
                let adapter = self.gateways.get(&transaction.provider)?;
                Ok(Some(adapter.status_of(&transaction.external_ref).await?))
            }
            None => Ok(None),
        }
    }
}
