//! Ownership-checked batch loading.

use std::collections::BTreeSet;

use common::{CustomerId, OrderId};
use domain::{Order, Transaction};
use store::{OrderRepository, TransactionRepository};

use crate::error::CheckoutError;
use crate::Result;

/// An order composed with its current gateway session, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderView {
    pub order: Order,
    pub transaction: Option<Transaction>,
}

/// Loads a batch of orders on behalf of a caller.
///
/// A requested id that is not returned by the repository means the id
/// does not exist or belongs to another customer. Either way the whole
/// fetch fails with an authorization error and no partial data; missing
/// ids are never silently dropped.
pub struct OrderFetcher<O, T> {
    orders: O,
    transactions: T,
}

impl<O, T> OrderFetcher<O, T>
where
    O: OrderRepository,
    T: TransactionRepository,
{
    /// Creates a fetcher over the given repositories.
    pub fn new(orders: O, transactions: T) -> Self {
        Self {
            orders,
            transactions,
        }
    }

    /// Loads every order in `order_ids` owned by `caller`, composed
    /// with its active transaction.
    ///
    /// Duplicate ids in the input are collapsed before the ownership
    /// check. Results are ordered by order id.
    #[tracing::instrument(skip(self, order_ids), fields(order_count = order_ids.len()))]
    pub async fn fetch_owned(
        &self,
        caller: CustomerId,
        order_ids: &[OrderId],
    ) -> Result<Vec<OrderView>> {
        let unique: Vec<OrderId> = order_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let orders = self.orders.get_by_ids(&unique, caller).await?;

        if orders.len() < unique.len() {
            tracing::warn!(
                %caller,
                requested = unique.len(),
                owned = orders.len(),
                "batch fetch rejected: caller does not own every requested order"
            );
            return Err(CheckoutError::Authorization {
                requested: unique.len(),
                owned: orders.len(),
            });
        }

        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            let transaction = self.transactions.get_active_for_order(order.id).await?;
            views.push(OrderView { order, transaction });
        }
        Ok(views)
    }
}
