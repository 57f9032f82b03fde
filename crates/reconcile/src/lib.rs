//! Reconciliation of asynchronous payment status events.
//!
//! Webhook-driven status updates arrive at least once and possibly out
//! of order. [`BatchView`] is the sole writer of "current status" for
//! the orders of one checkout session: transitions only flow forward,
//! duplicates are no-ops, and each terminal transition raises exactly
//! one user-visible notification. [`ReconciliationListener`] pumps a
//! change-feed subscription into the view and resubscribes when the
//! connection drops; missed events are not replayed, a full refresh
//! from the repositories is the recovery path.

pub mod listener;
pub mod notify;
pub mod stats;
pub mod view;

pub use listener::{ListenerHandle, ReconciliationListener};
pub use notify::{InMemoryNotificationSink, NotificationSink, PaymentNotice};
pub use stats::{BatchStats, aggregate};
pub use view::{ApplyOutcome, BatchView, OrderEntry};
