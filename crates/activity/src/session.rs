//! Startup and ownership of one complete hub session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use harmonyctl_hub_connection::{
    CommandQueue, ConnectionEvent, ConnectionSupervisor, Connector, HubClient, HubError,
    HubLocator,
};
use harmonyctl_protocol::constants::{
    ACTIVITY_GRACE_PERIOD, DISCOVERY_PORT, KEEPALIVE_INITIAL_DELAY, KEEPALIVE_PERIOD,
    WATCHDOG_TIMEOUT,
};
use harmonyctl_protocol::{Activity, ActivityId};

use crate::controller::{ActivityChangeController, ChangeResult, ChangeState};
use crate::keepalive::{KeepAliveScheduler, Refresher};
use crate::registry::{ActivityRecord, ActivityRegistry};

/// Timer settings for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Deadline for any single queued command.
    pub watchdog: Duration,
    /// How long a switch may take before success is assumed.
    pub grace: Duration,
    pub keepalive_delay: Duration,
    pub keepalive_period: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            watchdog: WATCHDOG_TIMEOUT,
            grace: ACTIVITY_GRACE_PERIOD,
            keepalive_delay: KEEPALIVE_INITIAL_DELAY,
            keepalive_period: KEEPALIVE_PERIOD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Static hub address; discovery is used when absent.
    pub address: Option<String>,
    pub discovery_port: u16,
    pub timings: Timings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: None,
            discovery_port: DISCOVERY_PORT,
            timings: Timings::default(),
        }
    }
}

/// A running session: located hub, serialized command queue, activity
/// state and keep-alive.
pub struct HubSession<K: Connector> {
    supervisor: Arc<ConnectionSupervisor<K>>,
    queue: CommandQueue<K>,
    registry: Arc<ActivityRegistry>,
    refresher: Refresher<K>,
    controller: ActivityChangeController<K>,
    cancel: CancellationToken,
}

impl<K: Connector> HubSession<K> {
    /// Locates and connects to the hub, loads its activities and starts
    /// the keep-alive.
    ///
    /// Any failure here is fatal for the session; nothing is retried.
    pub async fn start(config: SessionConfig, connector: K) -> Result<Self, HubError> {
        let locator =
            HubLocator::new(config.address.clone()).with_discovery_port(config.discovery_port);
        let (client, address) = locator.locate(&connector).await?;
        info!(address = %address, "connected to hub");

        let supervisor = Arc::new(ConnectionSupervisor::new(connector, address, client));
        let queue = CommandQueue::new(supervisor.clone(), config.timings.watchdog);

        let (activities, current) =
            match load_activities(&supervisor, queue.watchdog()).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    queue.shutdown();
                    return Err(e);
                }
            };

        let registry = Arc::new(ActivityRegistry::new(activities, &current));
        let refresher = Refresher::new(queue.clone(), registry.clone());
        let controller = ActivityChangeController::new(
            queue.clone(),
            registry.clone(),
            refresher.clone(),
            config.timings.grace,
        );

        let cancel = CancellationToken::new();
        KeepAliveScheduler::new(
            refresher.clone(),
            config.timings.keepalive_delay,
            config.timings.keepalive_period,
        )
        .spawn(cancel.clone());

        Ok(Self {
            supervisor,
            queue,
            registry,
            refresher,
            controller,
            cancel,
        })
    }

    /// See [`ActivityChangeController::request_activity`].
    pub async fn request_activity(&self, target: Option<ActivityId>) -> ChangeResult {
        self.controller.request_activity(target).await
    }

    pub async fn set_power(&self, id: ActivityId, on: bool) -> ChangeResult {
        self.controller.set_power(id, on).await
    }

    /// Registered activities in display order.
    pub fn activities(&self) -> Vec<Activity> {
        self.registry.activities()
    }

    pub fn records(&self) -> Vec<ActivityRecord> {
        self.registry.records()
    }

    pub fn current(&self) -> ActivityId {
        self.registry.current()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityRecord> {
        self.registry.subscribe()
    }

    pub fn change_state(&self) -> ChangeState {
        self.controller.state()
    }

    /// Queues a reconciliation with the hub. Returns false if one is
    /// already waiting.
    pub fn refresh(&self) -> bool {
        self.refresher.refresh()
    }

    /// Takes the connection event receiver. Can only be called once.
    pub async fn take_connection_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.supervisor.take_events().await
    }

    pub fn address(&self) -> &str {
        self.supervisor.address()
    }

    /// Stops the keep-alive and the queue. Pending switches resolve with
    /// [`HubError::Closed`].
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!(address = %self.address(), "shutting down hub session");
        self.cancel.cancel();
        self.queue.shutdown();
    }
}

impl<K: Connector> Drop for HubSession<K> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reads the activity list and current activity straight from the client,
/// bounded by the watchdog.
async fn load_activities<K: Connector>(
    supervisor: &ConnectionSupervisor<K>,
    watchdog: Duration,
) -> Result<(Vec<Activity>, ActivityId), HubError> {
    let client = supervisor.current().await;
    let load = async {
        info!("fetching activities");
        let activities = client.list_activities().await?;
        let current = client.current_activity().await?;
        Ok::<_, HubError>((activities, current))
    };

    let (activities, current) = tokio::time::timeout(watchdog, load)
        .await
        .map_err(|_| HubError::StartupTimeout)?
        .inspect_err(|e| error!(error = %e, "unable to load activities"))?;

    let labels: Vec<&str> = activities.iter().map(|a| a.label.as_str()).collect();
    info!(
        count = activities.len(),
        current = %current,
        "found activities: {}",
        labels.join(", ")
    );
    Ok((activities, current))
}
