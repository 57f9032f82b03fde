//! Gateway error types.

use thiserror::Error;

/// Errors returned by payment gateway adapters.
///
/// A gateway failure is always scoped to a single order; bulk payment
/// captures these per order instead of letting them abort siblings.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider rejected the initiation request.
    #[error("Payment declined: {0}")]
    Declined(String),

    /// The provider could not be reached or returned a transport error.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The request was malformed (bad amount, missing contact, ...).
    #[error("Invalid initiation request: {0}")]
    InvalidRequest(String),

    /// No adapter is registered under the requested provider name.
    #[error("Unknown payment provider: {0}")]
    UnknownProvider(String),

    /// The provider does not recognize the session reference.
    #[error("Unknown session reference: {0}")]
    UnknownReference(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
