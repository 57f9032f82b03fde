//! Split-checkout payment orchestration.
//!
//! One customer checkout spanning several stores yields one order per
//! store; each order is paid through an independent gateway session.
//! This crate owns the two entry points the UI layer calls:
//!
//! - [`CheckoutOrchestrator::pay_order`] for a single order, idempotent
//!   per order id (an existing usable session is returned, never
//!   duplicated).
//! - [`CheckoutOrchestrator::pay_all_pending`] for the whole batch:
//!   fan-out, collect-all, never fail-fast. Partial success is a valid
//!   terminal state reported per order in [`BatchResult`].
//!
//! Batch loading goes through [`OrderFetcher`], which turns any
//! requested-but-not-owned order id into an authorization failure
//! rather than a silently shorter result.

pub mod attribution;
pub mod error;
pub mod fetcher;
pub mod orchestrator;

pub use attribution::{
    Attribution, AttributionResolver, CustomerDirectory, InMemoryAttributionResolver,
    InMemoryCustomerDirectory, NoAttribution,
};
pub use error::{CheckoutError, Result};
pub use fetcher::{OrderFetcher, OrderView};
pub use orchestrator::{BatchResult, CheckoutOrchestrator};
