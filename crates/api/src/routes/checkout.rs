//! Checkout endpoints: batch views, payment initiation, reconciliation.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use checkout::{
    BatchResult, CheckoutOrchestrator, InMemoryAttributionResolver, InMemoryCustomerDirectory,
    OrderFetcher, OrderView,
};
use common::{CustomerId, OrderId};
use domain::{Order, Transaction};
use reconcile::{BatchStats, InMemoryNotificationSink, ListenerHandle, ReconciliationListener};
use serde::{Deserialize, Serialize};
use store::{ChangeFeed, FeedFilter, OrderRepository, TransactionRepository};

use crate::error::ApiError;

/// Name of the header carrying the authenticated customer identity.
///
/// Real deployments put an auth gateway in front of this service; the
/// header stands in for the identity that gateway would inject.
pub const CUSTOMER_HEADER: &str = "x-customer-id";

/// Shared application state accessible from all handlers.
pub struct AppState<S: Clone> {
    pub store: S,
    pub fetcher: OrderFetcher<S, S>,
    pub orchestrator:
        CheckoutOrchestrator<S, S, InMemoryAttributionResolver, InMemoryCustomerDirectory>,
    pub feed: ChangeFeed,
    pub view: reconcile::BatchView,
    pub notices: Arc<InMemoryNotificationSink>,
    pub listener: tokio::sync::Mutex<Option<ListenerHandle>>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct IdsQuery {
    /// Comma-separated order ids.
    pub ids: String,
}

#[derive(Deserialize)]
pub struct OrderIdsRequest {
    pub ids: Vec<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub store_name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub item_count: u32,
    pub payment_status: String,
    pub checkout_url: Option<String>,
}

impl OrderResponse {
    fn from_parts(order: &Order, transaction: Option<&Transaction>) -> Self {
        Self {
            id: order.id.to_string(),
            order_number: order.order_number.clone(),
            store_name: order.store_name.clone(),
            amount_cents: order.amount.cents(),
            currency: order.currency.to_string(),
            item_count: order.item_count,
            payment_status: order.payment_status.as_str().to_string(),
            checkout_url: transaction.map(|t| t.checkout_url.clone()),
        }
    }

    fn from_view(view: &OrderView) -> Self {
        Self::from_parts(&view.order, view.transaction.as_ref())
    }
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub total_cents: i64,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl From<BatchStats> for StatsResponse {
    fn from(stats: BatchStats) -> Self {
        Self {
            total_cents: stats.total.cents(),
            pending: stats.pending,
            processing: stats.processing,
            completed: stats.completed,
            failed: stats.failed,
        }
    }
}

#[derive(Serialize)]
pub struct PayResponse {
    pub checkout_url: String,
}

#[derive(Serialize)]
pub struct PayAllResponse {
    pub succeeded: usize,
    pub failed: usize,
    pub first_checkout_url: Option<String>,
    pub errors: std::collections::HashMap<String, String>,
}

impl From<BatchResult> for PayAllResponse {
    fn from(result: BatchResult) -> Self {
        Self {
            succeeded: result.succeeded,
            failed: result.failed,
            first_checkout_url: result.first_checkout_url,
            errors: result
                .per_order_errors
                .iter()
                .map(|(id, err)| (id.to_string(), err.to_string()))
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub orders: Vec<OrderResponse>,
    pub stats: StatsResponse,
}

// -- Extractor helpers --

fn caller_from(headers: &HeaderMap) -> Result<CustomerId, ApiError> {
    let raw = headers
        .get(CUSTOMER_HEADER)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {CUSTOMER_HEADER} header")))?
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("malformed {CUSTOMER_HEADER} header")))?;
    let uuid = uuid::Uuid::parse_str(raw)
        .map_err(|e| ApiError::BadRequest(format!("invalid customer id: {e}")))?;
    Ok(CustomerId::from_uuid(uuid))
}

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(raw)
        .map_err(|e| ApiError::BadRequest(format!("invalid order id {raw:?}: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}

fn parse_order_ids<'a>(raw: impl Iterator<Item = &'a str>) -> Result<Vec<OrderId>, ApiError> {
    let ids = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_order_id)
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        return Err(ApiError::BadRequest("no order ids given".to_string()));
    }
    Ok(ids)
}

// -- Handlers --

/// `GET /checkout/orders?ids=a,b,c`. Loads the caller's batch with
/// current sessions, straight from the repositories.
#[tracing::instrument(skip(state, headers, query))]
pub async fn orders<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Query(query): Query<IdsQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    S: OrderRepository + TransactionRepository + Clone + Send + Sync + 'static,
{
    let caller = caller_from(&headers)?;
    let ids = parse_order_ids(query.ids.split(','))?;
    let views = state.fetcher.fetch_owned(caller, &ids).await?;
    Ok(Json(views.iter().map(OrderResponse::from_view).collect()))
}

/// `GET /checkout/stats?ids=a,b,c`. Aggregate totals for the batch.
#[tracing::instrument(skip(state, headers, query))]
pub async fn stats<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Query(query): Query<IdsQuery>,
) -> Result<Json<StatsResponse>, ApiError>
where
    S: OrderRepository + TransactionRepository + Clone + Send + Sync + 'static,
{
    let caller = caller_from(&headers)?;
    let ids = parse_order_ids(query.ids.split(','))?;
    let views = state.fetcher.fetch_owned(caller, &ids).await?;
    let orders: Vec<Order> = views.into_iter().map(|v| v.order).collect();
    Ok(Json(reconcile::aggregate(&orders).into()))
}

/// `POST /checkout/orders/{id}/pay`. Initiates payment for one order
/// and returns the checkout URL to redirect the customer to.
#[tracing::instrument(skip(state, headers))]
pub async fn pay<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PayResponse>, ApiError>
where
    S: OrderRepository + TransactionRepository + Clone + Send + Sync + 'static,
{
    let caller = caller_from(&headers)?;
    let order_id = parse_order_id(&id)?;
    let checkout_url = state.orchestrator.pay_order(caller, order_id).await?;
    Ok(Json(PayResponse { checkout_url }))
}

/// `POST /checkout/pay-all`. Initiates payment for every payable order
/// in the batch. Partial failure is a 200 with per-order errors, not an
/// error status.
#[tracing::instrument(skip(state, headers, req))]
pub async fn pay_all<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<OrderIdsRequest>,
) -> Result<Json<PayAllResponse>, ApiError>
where
    S: OrderRepository + TransactionRepository + Clone + Send + Sync + 'static,
{
    let caller = caller_from(&headers)?;
    let ids = parse_order_ids(req.ids.iter().map(String::as_str))?;
    let views = state.fetcher.fetch_owned(caller, &ids).await?;
    let orders: Vec<Order> = views.into_iter().map(|v| v.order).collect();
    let result = state.orchestrator.pay_all_pending(caller, &orders).await;
    Ok(Json(result.into()))
}

/// `POST /checkout/refresh`. Re-reads authoritative state for the
/// batch, rescopes the live view and its feed listener to it, and
/// returns the snapshot.
///
/// The subscription is opened before the authoritative read so a
/// status change landing between the two is seen either in the
/// snapshot or on the feed, never lost.
#[tracing::instrument(skip(state, headers, req))]
pub async fn refresh<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<OrderIdsRequest>,
) -> Result<(StatusCode, Json<RefreshResponse>), ApiError>
where
    S: OrderRepository + TransactionRepository + Clone + Send + Sync + 'static,
{
    let caller = caller_from(&headers)?;
    let ids = parse_order_ids(req.ids.iter().map(String::as_str))?;

    let mut listener = state.listener.lock().await;
    if let Some(old) = listener.take() {
        old.stop().await;
    }

    let subscription = state.feed.subscribe(FeedFilter::for_orders(ids.clone()));

    let views = state.fetcher.fetch_owned(caller, &ids).await?;
    let entries = views
        .iter()
        .map(|v| reconcile::OrderEntry {
            order: v.order.clone(),
            transaction: v.transaction.clone(),
        })
        .collect();
    state.view.replace_all(entries).await;

    *listener = Some(ReconciliationListener::spawn(
        subscription,
        state.view.clone(),
    ));
    drop(listener);

    let stats = state.view.stats().await;
    Ok((
        StatusCode::OK,
        Json(RefreshResponse {
            orders: views.iter().map(OrderResponse::from_view).collect(),
            stats: stats.into(),
        }),
    ))
}

/// `GET /checkout/view`. Current state of the live batch view, as kept
/// up to date by the reconciliation listener.
#[tracing::instrument(skip(state))]
pub async fn view<S>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ViewResponse>, ApiError>
where
    S: OrderRepository + TransactionRepository + Clone + Send + Sync + 'static,
{
    let orders = state.view.orders().await;
    let mut responses = Vec::with_capacity(orders.len());
    for order in &orders {
        let transaction = state.view.get(order.id).await.and_then(|e| e.transaction);
        responses.push(OrderResponse::from_parts(order, transaction.as_ref()));
    }
    Ok(Json(ViewResponse {
        stale: state.view.is_stale(),
        stats: state.view.stats().await.into(),
        orders: responses,
    }))
}

#[derive(Serialize)]
pub struct ViewResponse {
    pub stale: bool,
    pub stats: StatsResponse,
    pub orders: Vec<OrderResponse>,
}
