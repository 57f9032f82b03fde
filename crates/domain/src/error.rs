//! Domain error types.

use common::OrderId;
use thiserror::Error;

use crate::status::PaymentStatus;

/// Errors raised by domain-level checks.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A status change would move an order backward or out of a
    /// terminal state.
    #[error("Invalid payment status transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// Payment cannot be initiated for the order in its current status.
    #[error("Order {order_id} is not payable in status {status}")]
    NotPayable {
        order_id: OrderId,
        status: PaymentStatus,
    },
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
