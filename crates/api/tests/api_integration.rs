//! Integration tests for the API server.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Currency, CustomerId, Money, StoreId};
use domain::{Order, PaymentStatus};
use gateway::InMemoryGateway;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, OrderRepository};
use tower::ServiceExt;

use api::routes::checkout::AppState;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestHarness {
    app: Router,
    state: Arc<AppState<InMemoryStore>>,
    payments: InMemoryGateway,
    customer: CustomerId,
}

impl TestHarness {
    fn new() -> Self {
        let (state, payments) = api::create_default_state("stripe");
        let app = api::create_app(state.clone(), get_metrics_handle());
        Self {
            app,
            state,
            payments,
            customer: CustomerId::new(),
        }
    }

    async fn seed_order(&self, cents: i64, status: PaymentStatus) -> Order {
        let mut order = Order::new(
            self.customer,
            StoreId::new(),
            "Api Store",
            format!("AS-{cents:05}"),
            Money::from_cents(cents),
            Currency::usd(),
            1,
        );
        order.payment_status = status;
        self.state.store.insert_order(order.clone()).await.unwrap();
        order
    }

    fn request(&self, method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-customer-id", self.customer.to_string());
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

#[tokio::test]
async fn test_health_check() {
    let h = TestHarness::new();
    let (status, json) = h.send(h.request("GET", "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_list_batch_orders() {
    let h = TestHarness::new();
    let a = h.seed_order(1500, PaymentStatus::Pending).await;
    let b = h.seed_order(2500, PaymentStatus::Completed).await;

    let uri = format!("/checkout/orders?ids={},{}", a.id, b.id);
    let (status, json) = h.send(h.request("GET", &uri, None)).await;

    assert_eq!(status, StatusCode::OK);
    let orders = json.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    let statuses: Vec<&str> = orders
        .iter()
        .map(|o| o["payment_status"].as_str().unwrap())
        .collect();
    assert!(statuses.contains(&"pending"));
    assert!(statuses.contains(&"completed"));
}

#[tokio::test]
async fn test_missing_customer_header_is_rejected() {
    let h = TestHarness::new();
    let order = h.seed_order(1000, PaymentStatus::Pending).await;

    let request = Request::builder()
        .uri(format!("/checkout/orders?ids={}", order.id))
        .body(Body::empty())
        .unwrap();
    let (status, json) = h.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("x-customer-id"));
}

#[tokio::test]
async fn test_foreign_order_is_forbidden() {
    let h = TestHarness::new();
    let mine = h.seed_order(1000, PaymentStatus::Pending).await;

    let mut foreign = Order::new(
        CustomerId::new(),
        StoreId::new(),
        "Other Store",
        "OS-00001",
        Money::from_cents(2000),
        Currency::usd(),
        1,
    );
    foreign.payment_status = PaymentStatus::Pending;
    h.state.store.insert_order(foreign.clone()).await.unwrap();

    let uri = format!("/checkout/orders?ids={},{}", mine.id, foreign.id);
    let (status, _) = h.send(h.request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/checkout/orders/{}/pay", foreign.id);
    let (status, _) = h.send(h.request("POST", &uri, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_pay_single_order_is_idempotent() {
    let h = TestHarness::new();
    let order = h.seed_order(4999, PaymentStatus::Pending).await;
    let uri = format!("/checkout/orders/{}/pay", order.id);

    let (status, first) = h.send(h.request("POST", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    let url = first["checkout_url"].as_str().unwrap().to_string();
    assert!(url.starts_with("https://pay.test/session/"));

    let (status, second) = h.send(h.request("POST", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["checkout_url"].as_str().unwrap(), url);
    assert_eq!(h.payments.session_count(), 1);
}

#[tokio::test]
async fn test_pay_completed_order_is_a_conflict() {
    let h = TestHarness::new();
    let order = h.seed_order(3000, PaymentStatus::Completed).await;

    let uri = format!("/checkout/orders/{}/pay", order.id);
    let (status, json) = h.send(h.request("POST", &uri, None)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().is_some());
    assert_eq!(h.payments.session_count(), 0);
}

#[tokio::test]
async fn test_stats_totals_and_counts() {
    let h = TestHarness::new();
    let a = h.seed_order(1000, PaymentStatus::Completed).await;
    let b = h.seed_order(2500, PaymentStatus::Pending).await;
    let c = h.seed_order(750, PaymentStatus::Failed).await;

    let uri = format!("/checkout/stats?ids={},{},{}", a.id, b.id, c.id);
    let (status, json) = h.send(h.request("GET", &uri, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_cents"], 4250);
    assert_eq!(json["completed"], 1);
    assert_eq!(json["pending"], 1);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["processing"], 0);
}

#[tokio::test]
async fn test_pay_all_reports_partial_failure() {
    let h = TestHarness::new();
    let a = h.seed_order(1000, PaymentStatus::Pending).await;
    let b = h.seed_order(2000, PaymentStatus::Pending).await;
    h.payments.set_fail_for(b.id);

    let body = serde_json::json!({ "ids": [a.id.to_string(), b.id.to_string()] });
    let (status, json) = h
        .send(h.request("POST", "/checkout/pay-all", Some(body)))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["succeeded"], 1);
    assert_eq!(json["failed"], 1);
    assert!(json["first_checkout_url"].as_str().is_some());
    assert!(json["errors"][b.id.to_string()].as_str().is_some());
}

#[tokio::test]
async fn test_invalid_order_id_format() {
    let h = TestHarness::new();

    let (status, _) = h
        .send(h.request("POST", "/checkout/orders/not-a-uuid/pay", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .send(h.request("GET", "/checkout/orders?ids=not-a-uuid", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_then_feed_updates_the_view() {
    let h = TestHarness::new();
    let order = h.seed_order(8800, PaymentStatus::Pending).await;

    let body = serde_json::json!({ "ids": [order.id.to_string()] });
    let (status, json) = h
        .send(h.request("POST", "/checkout/refresh", Some(body)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stats"]["pending"], 1);

    // Webhook-style status writes land on the feed and are reconciled
    // into the live view.
    h.state
        .store
        .update_payment_status(order.id, PaymentStatus::Processing)
        .await
        .unwrap();
    h.state
        .store
        .update_payment_status(order.id, PaymentStatus::Completed)
        .await
        .unwrap();

    let mut completed = 0;
    for _ in 0..50 {
        let (status, json) = h.send(h.request("GET", "/checkout/view", None)).await;
        assert_eq!(status, StatusCode::OK);
        completed = json["stats"]["completed"].as_u64().unwrap();
        if completed == 1 {
            assert_eq!(json["stale"], false);
            assert_eq!(json["orders"][0]["payment_status"], "completed");
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(completed, 1);

    // A terminal transition raises exactly one customer notification.
    let notices = h.state.notices.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].order_id, order.id);
    assert_eq!(notices[0].status, PaymentStatus::Completed);
}
