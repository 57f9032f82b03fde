//! Payment gateway adapters.
//!
//! [`PaymentGateway`] hides provider-specific request/response shapes
//! behind a single `initiate` / `status_of` contract. Providers are
//! looked up by name through the [`GatewayRegistry`]; tests script the
//! [`InMemoryGateway`] fake.

pub mod adapter;
pub mod error;
pub mod memory;
pub mod registry;

pub use adapter::{GatewayStatus, InitiateRequest, PaymentGateway, PaymentSession};
pub use error::{GatewayError, Result};
pub use memory::InMemoryGateway;
pub use registry::GatewayRegistry;
