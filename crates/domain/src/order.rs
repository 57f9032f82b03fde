//! The per-store order record.

use chrono::{DateTime, Utc};
use common::{Currency, CustomerId, Money, OrderId, StoreId};
use serde::{Deserialize, Serialize};

use crate::status::PaymentStatus;

/// A per-store purchase record owned by one customer.
///
/// A multi-vendor checkout creates one order per store in the cart, all
/// at the same instant. The owning customer never changes after
/// creation, and an order belongs to exactly one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Opaque identity.
    pub id: OrderId,

    /// Human-readable order number, unique per store.
    pub order_number: String,

    /// The owning customer. Immutable after creation.
    pub customer_id: CustomerId,

    /// The store this order belongs to.
    pub store_id: StoreId,

    /// Store display name, denormalized for display.
    pub store_name: String,

    /// Total amount to collect.
    pub amount: Money,

    /// Currency the amount is denominated in.
    pub currency: Currency,

    /// Number of line items in the order.
    pub item_count: u32,

    /// Current payment status.
    pub payment_status: PaymentStatus,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new pending order.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        customer_id: CustomerId,
        store_id: StoreId,
        store_name: impl Into<String>,
        order_number: impl Into<String>,
        amount: Money,
        currency: Currency,
        item_count: u32,
    ) -> Self {
        Self {
            id: OrderId::new(),
            order_number: order_number.into(),
            customer_id,
            store_id,
            store_name: store_name.into(),
            amount,
            currency,
            item_count,
            payment_status: PaymentStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Returns true if payment can still be initiated for this order.
    pub fn is_payable(&self) -> bool {
        self.payment_status.is_payable()
    }
}
