//! User-initiated activity switches.
//!
//! A switch runs as one queue task. The hub's answer decides the outcome,
//! unless the grace period passes first: then success is assumed and
//! reported straight away while the task keeps waiting for the hub.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use harmonyctl_hub_connection::{CommandQueue, Connector, HubClient, HubError};
use harmonyctl_protocol::ActivityId;

use crate::keepalive::Refresher;
use crate::registry::ActivityRegistry;

/// Outcome delivered to whoever requested a switch.
pub type ChangeResult = Result<ActivityId, HubError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeState {
    Idle,
    Changing { target: ActivityId },
}

/// The caller's side of one outstanding switch. Resolves at most once.
struct PendingChange {
    target: ActivityId,
    responder: Mutex<Option<oneshot::Sender<ChangeResult>>>,
}

impl PendingChange {
    fn new(target: ActivityId, responder: oneshot::Sender<ChangeResult>) -> Self {
        Self {
            target,
            responder: Mutex::new(Some(responder)),
        }
    }

    /// Returns false if the caller already got an answer.
    fn resolve(&self, result: ChangeResult) -> bool {
        let responder = self
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match responder {
            Some(tx) => {
                // The caller may have stopped waiting.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }
}

/// Everything one switch needs, shared by its action and its stall fallback.
struct ChangeTask<K: Connector> {
    pending: Arc<PendingChange>,
    registry: Arc<ActivityRegistry>,
    refresher: Refresher<K>,
    state: Arc<watch::Sender<ChangeState>>,
    grace: Duration,
}

impl<K: Connector> Clone for ChangeTask<K> {
    fn clone(&self) -> Self {
        Self {
            pending: self.pending.clone(),
            registry: self.registry.clone(),
            refresher: self.refresher.clone(),
            state: self.state.clone(),
            grace: self.grace,
        }
    }
}

impl<K: Connector> ChangeTask<K> {
    async fn run(self, client: Arc<K::Client>) {
        let target = self.pending.target.clone();
        info!(activity = %target, "setting activity");
        self.state.send_replace(ChangeState::Changing {
            target: target.clone(),
        });

        let mut start = client.start_activity(&target);
        let result = tokio::select! {
            result = &mut start => result,
            () = tokio::time::sleep(self.grace) => {
                info!(activity = %target, "setting activity is taking long, assuming success");
                self.registry.reconcile(&target);
                self.pending.resolve(Ok(target.clone()));
                self.state.send_replace(ChangeState::Idle);
                start.await
            }
        };

        match result {
            Ok(()) => {
                info!(activity = %target, "finished setting activity");
                self.registry.reconcile(&target);
                self.pending.resolve(Ok(target.clone()));
            }
            Err(e) => {
                warn!(activity = %target, error = %e, "failed setting activity");
                self.pending.resolve(Err(e));
                self.refresher.refresh();
            }
        }
        self.state.send_replace(ChangeState::Idle);
    }

    fn stalled(self) {
        warn!(activity = %self.pending.target, "setting activity stalled");
        self.state.send_replace(ChangeState::Idle);
        self.pending.resolve(Err(HubError::Stalled));
        self.refresher.refresh();
    }
}

/// Issues activity switches through the command queue.
pub struct ActivityChangeController<K: Connector> {
    queue: CommandQueue<K>,
    registry: Arc<ActivityRegistry>,
    refresher: Refresher<K>,
    state: Arc<watch::Sender<ChangeState>>,
    grace: Duration,
}

impl<K: Connector> Clone for ActivityChangeController<K> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            registry: self.registry.clone(),
            refresher: self.refresher.clone(),
            state: self.state.clone(),
            grace: self.grace,
        }
    }
}

impl<K: Connector> ActivityChangeController<K> {
    pub fn new(
        queue: CommandQueue<K>,
        registry: Arc<ActivityRegistry>,
        refresher: Refresher<K>,
        grace: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ChangeState::Idle);
        Self {
            queue,
            registry,
            refresher,
            state: Arc::new(state),
            grace,
        }
    }

    /// Switches the hub to `target`, or turns it off when `target` is `None`.
    ///
    /// Resolves with the activity that is now assumed current. Requests made
    /// while another switch is in flight wait their turn in the queue.
    pub async fn request_activity(&self, target: Option<ActivityId>) -> ChangeResult {
        let rx = self.submit(target)?;
        rx.await.unwrap_or(Err(HubError::Closed))
    }

    /// Queues a switch without waiting for it.
    pub fn submit(
        &self,
        target: Option<ActivityId>,
    ) -> Result<oneshot::Receiver<ChangeResult>, HubError> {
        let target = ActivityId::or_off(target);
        let (tx, rx) = oneshot::channel();

        let task = ChangeTask {
            pending: Arc::new(PendingChange::new(target.clone(), tx)),
            registry: self.registry.clone(),
            refresher: self.refresher.clone(),
            state: self.state.clone(),
            grace: self.grace,
        };
        let fallback = task.clone();

        info!(activity = %target, "queueing activity change");
        self.queue.enqueue_with_fallback(
            format!("set activity {target}"),
            move |client| task.run(client),
            move || fallback.stalled(),
        )?;
        Ok(rx)
    }

    /// Toggle semantics: on starts `id`, off powers the hub down.
    pub async fn set_power(&self, id: ActivityId, on: bool) -> ChangeResult {
        self.request_activity(on.then_some(id)).await
    }

    pub fn state(&self) -> ChangeState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChangeState> {
        self.state.subscribe()
    }
}
