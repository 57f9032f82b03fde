//! Durable order/transaction repositories and the change feed.
//!
//! The repositories are the only mutable shared state in the system;
//! every write goes through them and is announced on the
//! [`ChangeFeed`], which delivers at-least-once, per-connection-ordered
//! change events scoped to a batch of orders.
//!
//! Two backends ship with the crate: [`InMemoryStore`] for tests and
//! development, and [`PostgresStore`] for production.

pub mod error;
pub mod feed;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use error::{Result, StoreError};
pub use feed::{ChangeEvent, ChangeFeed, FeedError, FeedFilter, FeedSubscription};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{OrderRepository, TransactionRepository};
