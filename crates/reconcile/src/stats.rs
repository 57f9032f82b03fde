//! Aggregate statistics over a batch.

use common::Money;
use domain::{Order, PaymentStatus};

/// Totals and per-status counts for one batch of orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    /// Sum of all order amounts.
    pub total: Money,

    /// Orders awaiting payment initiation.
    pub pending: usize,

    /// Orders with a gateway session underway.
    pub processing: usize,

    /// Orders paid in full.
    pub completed: usize,

    /// Orders whose payment failed.
    pub failed: usize,
}

impl BatchStats {
    /// Number of orders counted.
    pub fn order_count(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// Computes aggregate statistics for a set of orders.
///
/// Pure function of its input, no I/O. Recomputed on every state change
/// rather than maintained incrementally; batch sizes are bounded by
/// cart size.
pub fn aggregate(orders: &[Order]) -> BatchStats {
    let mut stats = BatchStats::default();
    for order in orders {
        stats.total += order.amount;
        match order.payment_status {
            PaymentStatus::Pending => stats.pending += 1,
            PaymentStatus::Processing => stats.processing += 1,
            PaymentStatus::Completed => stats.completed += 1,
            PaymentStatus::Failed => stats.failed += 1,
        }
    }
    stats
}
