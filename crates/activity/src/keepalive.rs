//! Periodic reconciliation with the hub's current activity.
//!
//! Refreshing doubles as the connection keep-alive: an unanswered refresh
//! trips the queue watchdog and forces a reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use harmonyctl_hub_connection::{CommandQueue, Connector, HubClient};
use harmonyctl_protocol::constants::KEEPALIVE_PERIOD;

use crate::registry::ActivityRegistry;

/// Queues "read current activity, then reconcile" tasks, at most one
/// waiting at a time.
pub struct Refresher<K: Connector> {
    queue: CommandQueue<K>,
    registry: Arc<ActivityRegistry>,
    pending: Arc<AtomicBool>,
}

impl<K: Connector> Clone for Refresher<K> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            registry: self.registry.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<K: Connector> Refresher<K> {
    pub fn new(queue: CommandQueue<K>, registry: Arc<ActivityRegistry>) -> Self {
        Self {
            queue,
            registry,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queues a refresh unless one is already waiting to start.
    ///
    /// Returns whether a task was queued. The guard drops as soon as the
    /// queued task starts, so a running refresh never blocks the next one.
    /// If the task stalls, the refresh is queued again after reconnecting.
    pub fn refresh(&self) -> bool {
        if self.pending.swap(true, Ordering::SeqCst) {
            trace!("refresh already queued");
            return false;
        }

        let pending = self.pending.clone();
        let registry = self.registry.clone();
        let retry = self.clone();

        let queued = self.queue.enqueue_with_fallback(
            "refresh current activity",
            move |client: Arc<K::Client>| async move {
                pending.store(false, Ordering::SeqCst);
                debug!("refreshing current activity");
                match client.current_activity().await {
                    Ok(current) => registry.reconcile(&current),
                    Err(e) => warn!(error = %e, "failed to refresh current activity"),
                }
            },
            move || {
                retry.refresh();
            },
        );

        if let Err(e) = queued {
            self.pending.store(false, Ordering::SeqCst);
            debug!(error = %e, "refresh not queued");
            return false;
        }
        true
    }

    /// True while a refresh is queued but not yet started.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Drives [`Refresher::refresh`] on a fixed period after an initial delay.
pub struct KeepAliveScheduler<K: Connector> {
    refresher: Refresher<K>,
    initial_delay: Duration,
    period: Duration,
}

impl<K: Connector> KeepAliveScheduler<K> {
    /// A zero `period` falls back to [`KEEPALIVE_PERIOD`].
    pub fn new(refresher: Refresher<K>, initial_delay: Duration, period: Duration) -> Self {
        let period = if period.is_zero() {
            warn!(
                default_secs = KEEPALIVE_PERIOD.as_secs(),
                "zero keep-alive period, using default"
            );
            KEEPALIVE_PERIOD
        } else {
            period
        };
        Self {
            refresher,
            initial_delay,
            period,
        }
    }

    /// Waits `initial_delay`, then refreshes every `period` until cancelled.
    /// The first refresh happens one full period after the delay.
    pub async fn run(self, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.initial_delay) => {}
        }

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        debug!(period_secs = self.period.as_secs(), "keep-alive started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.refresher.refresh();
                }
            }
        }
        debug!("keep-alive stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
