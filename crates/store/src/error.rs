//! Store error types.

use common::OrderId;
use thiserror::Error;

/// Errors that can occur when interacting with the repositories.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A usable transaction already exists for the order. The caller
    /// should re-read and reuse it instead of creating a second one.
    #[error("Active transaction already exists for order {order_id}")]
    ConflictingTransaction { order_id: OrderId },

    /// A write violated a domain rule (e.g. a backward status move).
    #[error(transparent)]
    Domain(#[from] domain::DomainError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted value could not be decoded into a domain type.
    #[error("Corrupt stored value: {0}")]
    Decode(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
