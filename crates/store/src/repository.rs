//! Repository traits over the orders and transactions tables.

use async_trait::async_trait;
use common::{CustomerId, OrderId, TransactionId};
use domain::{Order, PaymentStatus, Transaction, TransactionStatus};

use crate::Result;

/// Read/write access to the orders table.
///
/// All implementations must be thread-safe (Send + Sync) and provide
/// row-level atomicity for a single order update; no cross-row
/// transactions are required.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Loads the orders with `id ∈ ids` that are owned by `owner`.
    ///
    /// Ids that do not exist or belong to another customer are simply
    /// absent from the result; interpreting the shortfall is the
    /// caller's job (the fetcher treats it as an authorization
    /// violation).
    async fn get_by_ids(&self, ids: &[OrderId], owner: CustomerId) -> Result<Vec<Order>>;

    /// Advances an order's payment status.
    ///
    /// Only forward transitions are accepted; anything else fails with
    /// a domain error. A successful write is announced on the change
    /// feed.
    async fn update_payment_status(&self, order_id: OrderId, status: PaymentStatus) -> Result<()>;

    /// Inserts a new order. Called by the (out-of-scope) cart checkout
    /// step; exposed here so tests and tooling can seed state.
    async fn insert_order(&self, order: Order) -> Result<()>;
}

/// Read/write access to the transactions table.
///
/// Transactions are an audit trail: they are created and re-statused,
/// never deleted.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Returns the order's current initiated transaction, if any.
    ///
    /// At most one transaction per order is in `Initiated` status at a
    /// time; terminal and superseded sessions are not returned.
    async fn get_active_for_order(&self, order_id: OrderId) -> Result<Option<Transaction>>;

    /// Persists a freshly initiated transaction.
    ///
    /// Fails with [`StoreError::ConflictingTransaction`] if a usable
    /// session already exists for the order (a concurrent initiation
    /// won the race). A stale `Initiated` session is marked `Expired`
    /// and superseded by the new row.
    ///
    /// [`StoreError::ConflictingTransaction`]: crate::StoreError::ConflictingTransaction
    async fn create(&self, transaction: Transaction) -> Result<Transaction>;

    /// Updates a transaction's session status.
    async fn update_status(&self, id: TransactionId, status: TransactionStatus) -> Result<()>;
}
