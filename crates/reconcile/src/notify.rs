//! One-time user-visible payment notifications.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::PaymentStatus;

/// A user-visible notice that an order reached a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotice {
    pub order_id: OrderId,
    pub status: PaymentStatus,
}

/// Receives terminal-transition notices.
///
/// The view guarantees at most one notice per transition even when the
/// underlying event is delivered more than once.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers a notice.
    async fn notify(&self, notice: PaymentNotice);
}

/// Collecting sink for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSink {
    notices: Arc<RwLock<Vec<PaymentNotice>>>,
}

impl InMemoryNotificationSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notice delivered so far, in order.
    pub fn notices(&self) -> Vec<PaymentNotice> {
        self.notices.read().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify(&self, notice: PaymentNotice) {
        self.notices.write().unwrap().push(notice);
    }
}
