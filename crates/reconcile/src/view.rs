//! The in-memory view of one batch's orders.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::OrderId;
use domain::{Order, Transaction};
use store::ChangeEvent;
use tokio::sync::RwLock;

use crate::notify::{NotificationSink, PaymentNotice};
use crate::stats::{self, BatchStats};

/// One order of the batch together with its current gateway session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEntry {
    pub order: Order,
    pub transaction: Option<Transaction>,
}

/// What [`BatchView::apply`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The transition moved state forward.
    Applied,

    /// Duplicate, backward, or out-of-scope event; state untouched.
    Ignored,
}

/// In-memory view of a batch, kept consistent with authoritative state
/// by the reconciliation listener.
///
/// This view is the sole writer of "current status". Feed events are
/// applied through the forward-only state machine, so duplicate and
/// out-of-order deliveries never regress an order. UI-triggered actions
/// only ever request transitions through the repositories; they never
/// set status here directly.
#[derive(Clone)]
pub struct BatchView {
    entries: Arc<RwLock<HashMap<OrderId, OrderEntry>>>,
    stale: Arc<AtomicBool>,
    sink: Arc<dyn NotificationSink>,
}

impl BatchView {
    /// Creates an empty view delivering notices to `sink`.
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            stale: Arc::new(AtomicBool::new(false)),
            sink,
        }
    }

    /// Replaces the whole view with authoritative state from the
    /// repositories and clears the stale flag.
    ///
    /// Refresh may move an order "backward" relative to a previously
    /// applied event; the repositories are authoritative, so the
    /// forward-only rule applies to feed events only.
    pub async fn replace_all(&self, entries: Vec<OrderEntry>) {
        let mut map = self.entries.write().await;
        map.clear();
        for entry in entries {
            map.insert(entry.order.id, entry);
        }
        drop(map);
        self.stale.store(false, Ordering::SeqCst);
    }

    /// Applies one change event.
    ///
    /// Events for orders outside the batch, backward transitions and
    /// duplicates are ignored. A transition into a terminal status
    /// raises exactly one notification.
    pub async fn apply(&self, event: &ChangeEvent) -> ApplyOutcome {
        let outcome = match event {
            ChangeEvent::Order { id, payment_status } => {
                self.apply_order_status(*id, *payment_status).await
            }
            ChangeEvent::Transaction {
                id,
                order_id,
                status,
            } => {
                let mut entries = self.entries.write().await;
                match entries.get_mut(order_id) {
                    Some(entry) => match entry.transaction.as_mut() {
                        Some(tx) if tx.id == *id => {
                            if tx.status == *status {
                                ApplyOutcome::Ignored
                            } else {
                                tx.status = *status;
                                ApplyOutcome::Applied
                            }
                        }
                        // A session minted after the last refresh.
                        // Track it with what the event carries; the
                        // checkout URL fills in on the next refresh. An
                        // expiry for an untracked id is a superseded
                        // predecessor, never the latest session.
                        _ if *status != domain::TransactionStatus::Expired => {
                            entry.transaction = Some(Transaction {
                                id: *id,
                                order_id: *order_id,
                                provider: String::new(),
                                checkout_url: String::new(),
                                external_ref: String::new(),
                                status: *status,
                                created_at: chrono::Utc::now(),
                            });
                            ApplyOutcome::Applied
                        }
                        _ => ApplyOutcome::Ignored,
                    },
                    None => ApplyOutcome::Ignored,
                }
            }
        };

        match outcome {
            ApplyOutcome::Applied => {
                metrics::counter!("reconcile_events_applied_total").increment(1);
            }
            ApplyOutcome::Ignored => {
                metrics::counter!("reconcile_events_ignored_total").increment(1);
            }
        }
        outcome
    }

    async fn apply_order_status(
        &self,
        order_id: OrderId,
        status: domain::PaymentStatus,
    ) -> ApplyOutcome {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&order_id) else {
            return ApplyOutcome::Ignored;
        };

        if !entry.order.payment_status.can_transition_to(status) {
            tracing::debug!(
                %order_id,
                from = %entry.order.payment_status,
                to = %status,
                "ignoring stale or duplicate status event"
            );
            return ApplyOutcome::Ignored;
        }

        entry.order.payment_status = status;
        drop(entries);

        if status.is_terminal() {
            self.sink.notify(PaymentNotice { order_id, status }).await;
        }
        ApplyOutcome::Applied
    }

    /// Marks the view as possibly behind authoritative state.
    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    /// Returns true if the view may be behind authoritative state and a
    /// refresh is advisable. Surfaced to the UI as "stale, refreshing",
    /// never as an error dialog.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    /// Snapshot of one entry.
    pub async fn get(&self, order_id: OrderId) -> Option<OrderEntry> {
        self.entries.read().await.get(&order_id).cloned()
    }

    /// Snapshot of all orders, sorted by id.
    pub async fn orders(&self) -> Vec<Order> {
        let entries = self.entries.read().await;
        let mut orders: Vec<Order> = entries.values().map(|e| e.order.clone()).collect();
        orders.sort_by_key(|o| o.id);
        orders
    }

    /// Aggregate statistics over the current order set. Recomputed on
    /// every call; batch sizes are bounded by cart size.
    pub async fn stats(&self) -> BatchStats {
        stats::aggregate(&self.orders().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::InMemoryNotificationSink;
    use common::{Currency, CustomerId, Money, StoreId};
    use domain::PaymentStatus;

    fn entry(cents: i64) -> OrderEntry {
        OrderEntry {
            order: Order::new(
                CustomerId::new(),
                StoreId::new(),
                "Test Store",
                format!("TS-{cents:04}"),
                Money::from_cents(cents),
                Currency::usd(),
                1,
            ),
            transaction: None,
        }
    }

    fn status_event(order_id: OrderId, status: PaymentStatus) -> ChangeEvent {
        ChangeEvent::Order {
            id: order_id,
            payment_status: status,
        }
    }

    async fn view_with_one_order() -> (BatchView, InMemoryNotificationSink, OrderId) {
        let sink = InMemoryNotificationSink::new();
        let view = BatchView::new(Arc::new(sink.clone()));
        let entry = entry(1000);
        let id = entry.order.id;
        view.replace_all(vec![entry]).await;
        (view, sink, id)
    }

    #[tokio::test]
    async fn test_forward_transition_applies() {
        let (view, _, id) = view_with_one_order().await;

        let outcome = view
            .apply(&status_event(id, PaymentStatus::Processing))
            .await;
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(
            view.get(id).await.unwrap().order.payment_status,
            PaymentStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_backward_event_after_terminal_is_ignored() {
        let (view, _, id) = view_with_one_order().await;

        // pending -> completed -> (stale) pending
        view.apply(&status_event(id, PaymentStatus::Completed)).await;
        let outcome = view.apply(&status_event(id, PaymentStatus::Pending)).await;

        assert_eq!(outcome, ApplyOutcome::Ignored);
        assert_eq!(
            view.get(id).await.unwrap().order.payment_status,
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_duplicate_terminal_event_notifies_once() {
        let (view, sink, id) = view_with_one_order().await;

        view.apply(&status_event(id, PaymentStatus::Completed)).await;
        view.apply(&status_event(id, PaymentStatus::Completed)).await;

        let notices = sink.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].order_id, id);
        assert_eq!(notices[0].status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_transition_notifies() {
        let (view, sink, id) = view_with_one_order().await;

        view.apply(&status_event(id, PaymentStatus::Failed)).await;

        assert_eq!(sink.notices()[0].status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_non_terminal_transition_does_not_notify() {
        let (view, sink, id) = view_with_one_order().await;

        view.apply(&status_event(id, PaymentStatus::Processing))
            .await;
        assert!(sink.notices().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_order_ignored() {
        let (view, _, _) = view_with_one_order().await;

        let outcome = view
            .apply(&status_event(OrderId::new(), PaymentStatus::Completed))
            .await;
        assert_eq!(outcome, ApplyOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_transaction_event_updates_session_status() {
        let sink = InMemoryNotificationSink::new();
        let view = BatchView::new(Arc::new(sink));
        let mut e = entry(1000);
        let order_id = e.order.id;
        let tx = domain::Transaction::new(order_id, "stripe", "https://pay/1", "ref-1");
        let tx_id = tx.id;
        e.transaction = Some(tx);
        view.replace_all(vec![e]).await;

        let outcome = view
            .apply(&ChangeEvent::Transaction {
                id: tx_id,
                order_id,
                status: domain::TransactionStatus::Paid,
            })
            .await;

        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(
            view.get(order_id).await.unwrap().transaction.unwrap().status,
            domain::TransactionStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_session_opened_after_refresh_is_tracked() {
        let (view, _, order_id) = view_with_one_order().await;
        let tx_id = common::TransactionId::new();

        // The view was refreshed before this session existed; its
        // status updates must still surface.
        let opened = view
            .apply(&ChangeEvent::Transaction {
                id: tx_id,
                order_id,
                status: domain::TransactionStatus::Initiated,
            })
            .await;
        assert_eq!(opened, ApplyOutcome::Applied);

        let paid = view
            .apply(&ChangeEvent::Transaction {
                id: tx_id,
                order_id,
                status: domain::TransactionStatus::Paid,
            })
            .await;
        assert_eq!(paid, ApplyOutcome::Applied);

        let tracked = view.get(order_id).await.unwrap().transaction.unwrap();
        assert_eq!(tracked.id, tx_id);
        assert_eq!(tracked.status, domain::TransactionStatus::Paid);
    }

    #[tokio::test]
    async fn test_expiry_for_superseded_session_does_not_replace_latest() {
        let (view, _, order_id) = view_with_one_order().await;
        let latest = common::TransactionId::new();
        let superseded = common::TransactionId::new();

        view.apply(&ChangeEvent::Transaction {
            id: latest,
            order_id,
            status: domain::TransactionStatus::Initiated,
        })
        .await;

        let outcome = view
            .apply(&ChangeEvent::Transaction {
                id: superseded,
                order_id,
                status: domain::TransactionStatus::Expired,
            })
            .await;

        assert_eq!(outcome, ApplyOutcome::Ignored);
        let tracked = view.get(order_id).await.unwrap().transaction.unwrap();
        assert_eq!(tracked.id, latest);
        assert_eq!(tracked.status, domain::TransactionStatus::Initiated);
    }

    #[tokio::test]
    async fn test_replace_all_clears_stale() {
        let (view, _, _) = view_with_one_order().await;

        view.mark_stale();
        assert!(view.is_stale());

        view.replace_all(vec![entry(2000)]).await;
        assert!(!view.is_stale());
        assert_eq!(view.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_event_sequence_settles_on_terminal() {
        let (view, sink, id) = view_with_one_order().await;

        // pending, completed, pending: third event must be ignored.
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Pending,
        ] {
            view.apply(&status_event(id, status)).await;
        }

        assert_eq!(
            view.get(id).await.unwrap().order.payment_status,
            PaymentStatus::Completed
        );
        assert_eq!(sink.notices().len(), 1);
    }
}
