//! In-memory repository backend for tests and development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, OrderId, TransactionId};
use domain::{DomainError, Order, PaymentStatus, Transaction, TransactionStatus};
use tokio::sync::RwLock;

use crate::feed::{ChangeEvent, ChangeFeed};
use crate::repository::{OrderRepository, TransactionRepository};
use crate::{Result, StoreError};

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    transactions: Vec<Transaction>,
}

/// In-memory backend implementing both repositories.
///
/// Stores all rows in memory behind a single lock and publishes every
/// write to the change feed, giving tests the same observable behavior
/// as the PostgreSQL backend.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
    feed: ChangeFeed,
}

impl InMemoryStore {
    /// Creates an empty store with its own change feed.
    pub fn new() -> Self {
        Self::with_feed(ChangeFeed::new())
    }

    /// Creates an empty store publishing to an existing feed.
    pub fn with_feed(feed: ChangeFeed) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            feed,
        }
    }

    /// The change feed this store publishes to.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Reads an order regardless of owner (test observability).
    pub async fn order(&self, id: OrderId) -> Option<Order> {
        self.inner.read().await.orders.get(&id).cloned()
    }

    /// Total number of transaction rows for an order, any status.
    pub async fn transaction_count_for(&self, order_id: OrderId) -> usize {
        self.inner
            .read()
            .await
            .transactions
            .iter()
            .filter(|t| t.order_id == order_id)
            .count()
    }

    /// Clears all rows.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.orders.clear();
        inner.transactions.clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn get_by_ids(&self, ids: &[OrderId], owner: CustomerId) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = ids
            .iter()
            .filter_map(|id| inner.orders.get(id))
            .filter(|o| o.customer_id == owner)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    async fn update_payment_status(&self, order_id: OrderId, status: PaymentStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if !order.payment_status.can_transition_to(status) {
            return Err(DomainError::InvalidTransition {
                order_id,
                from: order.payment_status,
                to: status,
            }
            .into());
        }

        order.payment_status = status;
        drop(inner);

        self.feed.publish(ChangeEvent::Order {
            id: order_id,
            payment_status: status,
        });
        Ok(())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        self.inner.write().await.orders.insert(order.id, order);
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn get_active_for_order(&self, order_id: OrderId) -> Result<Option<Transaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.order_id == order_id && t.status == TransactionStatus::Initiated)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn create(&self, transaction: Transaction) -> Result<Transaction> {
        let order_id = transaction.order_id;
        let now = Utc::now();
        let mut superseded: Option<TransactionId> = None;

        {
            let mut inner = self.inner.write().await;

            let existing = inner
                .transactions
                .iter_mut()
                .find(|t| t.order_id == order_id && t.status == TransactionStatus::Initiated);

            if let Some(existing) = existing {
                if existing.is_usable(now) {
                    return Err(StoreError::ConflictingTransaction { order_id });
                }
                // Stale session: supersede it, keep the row for audit.
                existing.status = TransactionStatus::Expired;
                superseded = Some(existing.id);
            }

            inner.transactions.push(transaction.clone());
        }

        if let Some(id) = superseded {
            self.feed.publish(ChangeEvent::Transaction {
                id,
                order_id,
                status: TransactionStatus::Expired,
            });
        }
        self.feed.publish(ChangeEvent::Transaction {
            id: transaction.id,
            order_id,
            status: transaction.status,
        });

        Ok(transaction)
    }

    async fn update_status(&self, id: TransactionId, status: TransactionStatus) -> Result<()> {
        let order_id = {
            let mut inner = self.inner.write().await;
            let tx = inner
                .transactions
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| StoreError::Decode(format!("unknown transaction {id}")))?;
            tx.status = status;
            tx.order_id
        };

        self.feed.publish(ChangeEvent::Transaction {
            id,
            order_id,
            status,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{Currency, Money, StoreId};
    use domain::SESSION_VALIDITY;

    fn order_for(customer: CustomerId, cents: i64) -> Order {
        Order::new(
            customer,
            StoreId::new(),
            "Test Store",
            "TS-0001",
            Money::from_cents(cents),
            Currency::usd(),
            1,
        )
    }

    #[tokio::test]
    async fn get_by_ids_filters_by_owner() {
        let store = InMemoryStore::new();
        let alice = CustomerId::new();
        let bob = CustomerId::new();

        let mine = order_for(alice, 1000);
        let theirs = order_for(bob, 2000);
        store.insert_order(mine.clone()).await.unwrap();
        store.insert_order(theirs.clone()).await.unwrap();

        let loaded = store.get_by_ids(&[mine.id, theirs.id], alice).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, mine.id);
    }

    #[tokio::test]
    async fn get_by_ids_returns_sorted_by_id() {
        let store = InMemoryStore::new();
        let customer = CustomerId::new();

        let mut ids = Vec::new();
        for cents in [100, 200, 300] {
            let order = order_for(customer, cents);
            ids.push(order.id);
            store.insert_order(order).await.unwrap();
        }

        let loaded = store.get_by_ids(&ids, customer).await.unwrap();
        let loaded_ids: Vec<_> = loaded.iter().map(|o| o.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(loaded_ids, sorted);
    }

    #[tokio::test]
    async fn forward_status_update_succeeds_and_publishes() {
        let store = InMemoryStore::new();
        let customer = CustomerId::new();
        let order = order_for(customer, 1000);
        let id = order.id;
        store.insert_order(order).await.unwrap();

        let mut sub = store
            .feed()
            .subscribe(crate::FeedFilter::for_orders([id]));

        store
            .update_payment_status(id, PaymentStatus::Processing)
            .await
            .unwrap();

        assert_eq!(
            store.order(id).await.unwrap().payment_status,
            PaymentStatus::Processing
        );
        assert_eq!(
            sub.recv().await.unwrap(),
            ChangeEvent::Order {
                id,
                payment_status: PaymentStatus::Processing
            }
        );
    }

    #[tokio::test]
    async fn backward_status_update_is_rejected() {
        let store = InMemoryStore::new();
        let customer = CustomerId::new();
        let order = order_for(customer, 1000);
        let id = order.id;
        store.insert_order(order).await.unwrap();

        store
            .update_payment_status(id, PaymentStatus::Completed)
            .await
            .unwrap();

        let err = store
            .update_payment_status(id, PaymentStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(_)));
        assert_eq!(
            store.order(id).await.unwrap().payment_status,
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn create_rejects_second_usable_transaction() {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();

        store
            .create(Transaction::new(order_id, "stripe", "https://pay/1", "ref-1"))
            .await
            .unwrap();

        let err = store
            .create(Transaction::new(order_id, "stripe", "https://pay/2", "ref-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConflictingTransaction { .. }));
        assert_eq!(store.transaction_count_for(order_id).await, 1);
    }

    #[tokio::test]
    async fn create_supersedes_stale_transaction() {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();

        let mut stale = Transaction::new(order_id, "stripe", "https://pay/1", "ref-1");
        stale.created_at = Utc::now() - SESSION_VALIDITY - Duration::seconds(1);
        let stale_id = stale.id;
        store.create(stale).await.unwrap();

        let fresh = store
            .create(Transaction::new(order_id, "stripe", "https://pay/2", "ref-2"))
            .await
            .unwrap();

        // Both rows survive (audit trail), only the fresh one is active.
        assert_eq!(store.transaction_count_for(order_id).await, 2);
        let active = store.get_active_for_order(order_id).await.unwrap().unwrap();
        assert_eq!(active.id, fresh.id);
        assert_ne!(active.id, stale_id);
    }

    #[tokio::test]
    async fn get_active_ignores_terminal_transactions() {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();

        let tx = store
            .create(Transaction::new(order_id, "stripe", "https://pay/1", "ref-1"))
            .await
            .unwrap();
        store
            .update_status(tx.id, TransactionStatus::Paid)
            .await
            .unwrap();

        assert!(store.get_active_for_order(order_id).await.unwrap().is_none());
    }
}
