//! The change-feed pump.

use store::{FeedError, FeedSubscription};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::view::BatchView;

/// Handle to a running listener.
///
/// The subscription is a scoped resource: dropping the handle without
/// calling [`stop`] aborts the pump task, which tears the feed
/// connection down with it. Either way nothing leaks.
///
/// [`stop`]: ListenerHandle::stop
pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stops the pump and waits for it to wind down.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        let _ = (&mut self.task).await;
    }

    /// Returns true if the pump task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Pumps change-feed events into a [`BatchView`].
pub struct ReconciliationListener;

impl ReconciliationListener {
    /// Spawns the pump for one subscription.
    ///
    /// The loop suspends awaiting the next event until stopped. On a
    /// dropped connection it marks the view stale, resubscribes and
    /// keeps going; missed events are not replayed (the caller refreshes
    /// from the repositories). When the feed itself closes, the pump
    /// exits.
    pub fn spawn(mut subscription: FeedSubscription, view: BatchView) -> ListenerHandle {
        let (shutdown, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    result = subscription.recv() => match result {
                        Ok(event) => {
                            view.apply(&event).await;
                        }
                        Err(FeedError::Disconnected { skipped }) => {
                            tracing::warn!(skipped, "feed connection lagged, resubscribing");
                            metrics::counter!("feed_resubscribes_total").increment(1);
                            view.mark_stale();
                            subscription.resubscribe();
                        }
                        Err(FeedError::Closed) => {
                            tracing::info!("change feed closed, listener exiting");
                            break;
                        }
                    }
                }
            }
        });

        ListenerHandle { shutdown, task }
    }
}
