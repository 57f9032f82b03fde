//! Change feed: at-least-once status change notifications.
//!
//! The feed is a subscribe-by-filter primitive. A subscription is
//! scoped to a batch of order ids and delivers every matching change
//! event at least once, ordered per connection but not globally. A
//! subscriber that falls behind loses its window into the stream and
//! must resubscribe and refresh from the repositories; missed events
//! are not replayed.

use std::collections::HashSet;

use common::{OrderId, TransactionId};
use domain::{PaymentStatus, TransactionStatus};
use thiserror::Error;
use tokio::sync::broadcast;

/// Default buffer size for feed connections.
const DEFAULT_CAPACITY: usize = 256;

/// A single change announcement from the system of record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// An order's payment status was written.
    Order {
        id: OrderId,
        payment_status: PaymentStatus,
    },

    /// A transaction row was created or re-statused.
    Transaction {
        id: TransactionId,
        order_id: OrderId,
        status: TransactionStatus,
    },
}

impl ChangeEvent {
    /// The order this event pertains to.
    pub fn order_id(&self) -> OrderId {
        match self {
            ChangeEvent::Order { id, .. } => *id,
            ChangeEvent::Transaction { order_id, .. } => *order_id,
        }
    }
}

/// Subscription filter: which orders a connection cares about.
#[derive(Debug, Clone, Default)]
pub struct FeedFilter {
    order_ids: HashSet<OrderId>,
}

impl FeedFilter {
    /// Filter scoped to the given batch of orders.
    pub fn for_orders(ids: impl IntoIterator<Item = OrderId>) -> Self {
        Self {
            order_ids: ids.into_iter().collect(),
        }
    }

    /// Returns true if the event falls inside this filter's scope.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.order_ids.contains(&event.order_id())
    }
}

/// Errors surfaced by a feed subscription.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    /// The connection fell behind and `skipped` events were dropped.
    /// Recovery is resubscribe + full refresh from the repositories.
    #[error("Feed connection lagged, {skipped} events dropped")]
    Disconnected { skipped: u64 },

    /// The feed was shut down; no more events will arrive.
    #[error("Feed closed")]
    Closed,
}

/// Broadcast-backed change feed handle.
///
/// Cloning is cheap; all clones publish into the same stream.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Creates a feed with the default connection buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a feed whose connections buffer up to `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to every live subscription.
    ///
    /// Publishing with no subscribers is a no-op, not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    /// Opens a subscription scoped to `filter`.
    pub fn subscribe(&self, filter: FeedFilter) -> FeedSubscription {
        FeedSubscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    /// Number of live subscriptions (test observability).
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// One connection to the change feed.
///
/// Dropping the subscription tears down the connection; there is no
/// implicit cleanup to wait for.
pub struct FeedSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: FeedFilter,
}

impl FeedSubscription {
    /// Waits for the next event matching the filter.
    ///
    /// Suspends indefinitely until an event arrives or the connection
    /// breaks. A [`FeedError::Disconnected`] means events were dropped;
    /// the connection itself keeps delivering from the oldest retained
    /// event, but the caller should treat its view as stale.
    pub async fn recv(&mut self) -> Result<ChangeEvent, FeedError> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Err(FeedError::Disconnected { skipped });
                }
                Err(broadcast::error::RecvError::Closed) => return Err(FeedError::Closed),
            }
        }
    }

    /// Drops the current connection and opens a fresh one with the same
    /// filter, positioned at the stream's tail. Events published in
    /// between are lost. Holds no sender, so a subscription never keeps
    /// a closed feed alive.
    pub fn resubscribe(&mut self) {
        self.rx = self.rx.resubscribe();
    }
}
