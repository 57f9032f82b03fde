//! HTTP API server with observability for split checkout.
//!
//! Exposes the checkout flow over REST: batch views, single and bulk
//! payment initiation, and reconciliation refresh, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{
    CheckoutOrchestrator, InMemoryAttributionResolver, InMemoryCustomerDirectory, OrderFetcher,
};
use gateway::{GatewayRegistry, InMemoryGateway};
use metrics_exporter_prometheus::PrometheusHandle;
use reconcile::{BatchView, InMemoryNotificationSink};
use store::{ChangeFeed, InMemoryStore, OrderRepository, TransactionRepository};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::checkout::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router
where
    S: OrderRepository + TransactionRepository + Clone + Send + Sync + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout/orders", get(routes::checkout::orders::<S>))
        .route("/checkout/stats", get(routes::checkout::stats::<S>))
        .route(
            "/checkout/orders/{id}/pay",
            post(routes::checkout::pay::<S>),
        )
        .route("/checkout/pay-all", post(routes::checkout::pay_all::<S>))
        .route("/checkout/refresh", post(routes::checkout::refresh::<S>))
        .route("/checkout/view", get(routes::checkout::view::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires application state around any repository backend.
///
/// Returns the gateway fake alongside the state so tests can script
/// failures and inspect initiated sessions. Real provider adapters
/// would be registered here instead.
pub fn create_state<S>(store: S, feed: ChangeFeed, provider: &str) -> (Arc<AppState<S>>, InMemoryGateway)
where
    S: OrderRepository + TransactionRepository + Clone + Send + Sync + 'static,
{
    let payments = InMemoryGateway::new();
    let registry = GatewayRegistry::new().register(provider, Arc::new(payments.clone()));

    let attribution = InMemoryAttributionResolver::new();
    let directory = InMemoryCustomerDirectory::new();
    let orchestrator = CheckoutOrchestrator::new(
        store.clone(),
        store.clone(),
        registry,
        provider,
        attribution,
        directory,
    );
    let fetcher = OrderFetcher::new(store.clone(), store.clone());

    let notices = Arc::new(InMemoryNotificationSink::new());
    let view = BatchView::new(notices.clone());

    let state = Arc::new(AppState {
        store,
        fetcher,
        orchestrator,
        feed,
        view,
        notices,
        listener: tokio::sync::Mutex::new(None),
    });

    (state, payments)
}

/// Creates application state over in-memory backends.
pub fn create_default_state(provider: &str) -> (Arc<AppState<InMemoryStore>>, InMemoryGateway) {
    let feed = ChangeFeed::new();
    let store = InMemoryStore::with_feed(feed.clone());
    create_state(store, feed, provider)
}
