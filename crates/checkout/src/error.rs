//! Checkout error taxonomy.

use common::OrderId;
use domain::PaymentStatus;
use gateway::GatewayError;
use store::StoreError;
use thiserror::Error;

/// Errors raised by the checkout core.
///
/// Authorization failures are fatal to the whole operation and carry no
/// partial data. Gateway failures are scoped to one order; bulk payment
/// captures them in [`BatchResult::per_order_errors`] instead of
/// propagating, so callers can see which orders still need a retry.
///
/// [`BatchResult::per_order_errors`]: crate::BatchResult::per_order_errors
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The caller requested orders they do not own (or that do not
    /// exist). Never reported as a partial result.
    #[error("Authorization failed: requested {requested} orders, caller owns {owned}")]
    Authorization { requested: usize, owned: usize },

    /// Payment cannot be initiated for the order in its current status.
    #[error("Order {order_id} is not payable in status {status}")]
    NotPayable {
        order_id: OrderId,
        status: PaymentStatus,
    },

    /// The payment provider rejected or could not complete initiation.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Two initiations raced and the losing side could not recover the
    /// winner's session. Retryable.
    #[error("Concurrent initiation conflict for order {order_id}")]
    Conflict { order_id: OrderId },

    /// Repository failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A spawned payment task panicked or was aborted.
    #[error("Payment task failed: {0}")]
    Task(String),
}

/// Result type for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;
