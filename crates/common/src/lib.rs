//! Shared types for the split-checkout core.
//!
//! Typed UUID wrappers keep order, customer, store and transaction
//! identifiers from being mixed up at call sites, and [`Money`] keeps
//! monetary amounts in integer minor units.

pub mod types;

pub use types::{Currency, CustomerId, Money, OrderId, StoreId, TransactionId};
