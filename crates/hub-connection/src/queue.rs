//! Strictly serial command runner with a stall watchdog.
//!
//! Each task gets the current client. Whichever comes first, task
//! completion or watchdog expiry, decides the outcome: an expired task's
//! future is dropped (abandoning its in-flight call), the connection is
//! replaced, and the task's fallback runs instead.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use harmonyctl_protocol::constants::WATCHDOG_TIMEOUT;

use crate::error::HubError;
use crate::rpc::Connector;
use crate::supervisor::ConnectionSupervisor;

/// Body of a queued command.
pub type Action<C> = Box<dyn FnOnce(Arc<C>) -> BoxFuture<'static, ()> + Send>;

/// Fallback run in place of a stalled command, after reconnecting.
pub type StallHandler = Box<dyn FnOnce() + Send>;

struct Task<C> {
    name: String,
    action: Action<C>,
    on_stall: Option<StallHandler>,
}

enum Outcome {
    Completed,
    Stalled,
    Cancelled,
}

/// Serial queue of commands against the supervised hub.
pub struct CommandQueue<K: Connector> {
    tx: mpsc::UnboundedSender<Task<K::Client>>,
    queued: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    watchdog: Duration,
}

impl<K: Connector> Clone for CommandQueue<K> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            queued: self.queued.clone(),
            running: self.running.clone(),
            cancel: self.cancel.clone(),
            watchdog: self.watchdog,
        }
    }
}

impl<K: Connector> CommandQueue<K> {
    /// Starts the drain loop. Must be called within a Tokio runtime.
    ///
    /// A zero `watchdog` falls back to [`WATCHDOG_TIMEOUT`].
    pub fn new(supervisor: Arc<ConnectionSupervisor<K>>, watchdog: Duration) -> Self {
        let watchdog = if watchdog.is_zero() {
            warn!(
                default_secs = WATCHDOG_TIMEOUT.as_secs(),
                "zero watchdog, using default"
            );
            WATCHDOG_TIMEOUT
        } else {
            watchdog
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        tokio::spawn(drain_loop(
            supervisor,
            rx,
            watchdog,
            queued.clone(),
            running.clone(),
            cancel.clone(),
        ));

        Self {
            tx,
            queued,
            running,
            cancel,
            watchdog,
        }
    }

    /// Deadline applied to each task.
    pub fn watchdog(&self) -> Duration {
        self.watchdog
    }

    /// Queues a command with no stall fallback.
    pub fn enqueue<F, Fut>(&self, name: impl Into<String>, action: F) -> Result<(), HubError>
    where
        F: FnOnce(Arc<K::Client>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.push(Task {
            name: name.into(),
            action: Box::new(move |client| action(client).boxed()),
            on_stall: None,
        })
    }

    /// Queues a command whose `on_stall` runs if the watchdog expires.
    pub fn enqueue_with_fallback<F, Fut, S>(
        &self,
        name: impl Into<String>,
        action: F,
        on_stall: S,
    ) -> Result<(), HubError>
    where
        F: FnOnce(Arc<K::Client>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        S: FnOnce() + Send + 'static,
    {
        self.push(Task {
            name: name.into(),
            action: Box::new(move |client| action(client).boxed()),
            on_stall: Some(Box::new(on_stall)),
        })
    }

    fn push(&self, task: Task<K::Client>) -> Result<(), HubError> {
        if self.cancel.is_cancelled() {
            return Err(HubError::Closed);
        }
        trace!(task = %task.name, "queueing task");
        self.queued.fetch_add(1, Ordering::SeqCst);
        self.tx.send(task).map_err(|_| {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            HubError::Closed
        })
    }

    /// Number of tasks waiting to start.
    pub fn len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a task is executing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the drain loop. Queued tasks are dropped unrun.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn drain_loop<K: Connector>(
    supervisor: Arc<ConnectionSupervisor<K>>,
    mut rx: mpsc::UnboundedReceiver<Task<K::Client>>,
    watchdog: Duration,
    queued: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            _ = cancel.cancelled() => break,
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };
        queued.fetch_sub(1, Ordering::SeqCst);
        running.store(true, Ordering::SeqCst);

        let Task {
            name,
            action,
            on_stall,
        } = task;

        // Fetched fresh for every task: a reconnect may have replaced it.
        let client = supervisor.current_or_reconnect().await;
        trace!(task = %name, "running task");

        let outcome = tokio::select! {
            () = action(client) => Outcome::Completed,
            () = tokio::time::sleep(watchdog) => Outcome::Stalled,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        match outcome {
            Outcome::Completed => trace!(task = %name, "task finished"),
            Outcome::Stalled => {
                warn!(
                    task = %name,
                    timeout_secs = watchdog.as_secs(),
                    "task stalled, reconnecting to hub"
                );
                supervisor.note_stall(&name);
                // A failed reconnect is escalated by the supervisor; the
                // next stall retries it.
                let _ = supervisor.reconnect().await;
                if let Some(on_stall) = on_stall {
                    on_stall();
                }
            }
            Outcome::Cancelled => {
                running.store(false, Ordering::SeqCst);
                break;
            }
        }

        running.store(false, Ordering::SeqCst);
    }

    debug!("command queue stopped");
}
