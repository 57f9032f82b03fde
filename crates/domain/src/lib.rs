//! Domain records for multi-vendor split checkout.
//!
//! A single customer checkout spanning several stores produces one
//! [`Order`] per store. Each order is driven through an independent
//! payment-gateway [`Transaction`]; its [`PaymentStatus`] only ever
//! moves forward.

pub mod error;
pub mod order;
pub mod status;
pub mod transaction;

pub use error::DomainError;
pub use order::Order;
pub use status::PaymentStatus;
pub use transaction::{SESSION_VALIDITY, Transaction, TransactionStatus};
