//! In-memory hub used by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use harmonyctl_hub_connection::{
    CommandQueue, ConnectionSupervisor, Connector, HubClient, HubError,
};
use harmonyctl_protocol::{Activity, ActivityId};

use crate::keepalive::Refresher;
use crate::registry::ActivityRegistry;

/// How the next `start_activity` call behaves.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Start {
    Confirm(Duration),
    Fail(Duration),
    Hang,
}

pub(crate) struct HubState {
    pub(crate) activities: Vec<Activity>,
    pub(crate) current: Mutex<ActivityId>,
    pub(crate) script: Mutex<VecDeque<Start>>,
    pub(crate) starts: Mutex<Vec<ActivityId>>,
    pub(crate) current_calls: AtomicUsize,
    pub(crate) hang_current: AtomicBool,
    pub(crate) connects: AtomicUsize,
}

/// Acts as both the connector and, through [`FakeClient`], the hub.
#[derive(Clone)]
pub(crate) struct FakeHub(pub(crate) Arc<HubState>);

impl FakeHub {
    pub(crate) fn new(current: &str) -> Self {
        Self(Arc::new(HubState {
            activities: vec![
                Activity::new("1", "Watch TV"),
                Activity::new("2", "Listen Music"),
                Activity::new("-1", "PowerOff"),
            ],
            current: Mutex::new(current.into()),
            script: Mutex::new(VecDeque::new()),
            starts: Mutex::new(Vec::new()),
            current_calls: AtomicUsize::new(0),
            hang_current: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        }))
    }

    pub(crate) fn client(&self) -> FakeClient {
        FakeClient(self.0.clone())
    }

    pub(crate) fn script(&self, start: Start) {
        self.0.script.lock().unwrap().push_back(start);
    }

    pub(crate) fn current(&self) -> ActivityId {
        self.0.current.lock().unwrap().clone()
    }

    pub(crate) fn current_calls(&self) -> usize {
        self.0.current_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn connects(&self) -> usize {
        self.0.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn starts(&self) -> Vec<ActivityId> {
        self.0.starts.lock().unwrap().clone()
    }
}

pub(crate) struct FakeClient(Arc<HubState>);

impl HubClient for FakeClient {
    fn list_activities(&self) -> BoxFuture<'_, Result<Vec<Activity>, HubError>> {
        async move { Ok(self.0.activities.clone()) }.boxed()
    }

    fn current_activity(&self) -> BoxFuture<'_, Result<ActivityId, HubError>> {
        async move {
            self.0.current_calls.fetch_add(1, Ordering::SeqCst);
            if self.0.hang_current.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(self.0.current.lock().unwrap().clone())
        }
        .boxed()
    }

    fn start_activity<'a>(&'a self, id: &'a ActivityId) -> BoxFuture<'a, Result<(), HubError>> {
        async move {
            self.0.starts.lock().unwrap().push(id.clone());
            let next = self.0.script.lock().unwrap().pop_front();
            match next.unwrap_or(Start::Confirm(Duration::ZERO)) {
                Start::Confirm(after) => {
                    tokio::time::sleep(after).await;
                    *self.0.current.lock().unwrap() = id.clone();
                    Ok(())
                }
                Start::Fail(after) => {
                    tokio::time::sleep(after).await;
                    Err(HubError::Rpc {
                        code: 500,
                        message: "activity start rejected".into(),
                    })
                }
                Start::Hang => std::future::pending().await,
            }
        }
        .boxed()
    }
}

impl Connector for FakeHub {
    type Client = FakeClient;

    fn connect<'a>(&'a self, _address: &'a str) -> BoxFuture<'a, Result<FakeClient, HubError>> {
        async move {
            self.0.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.client())
        }
        .boxed()
    }
}

pub(crate) const WATCHDOG: Duration = Duration::from_secs(60);

/// Queue, registry and refresher wired to `hub`, as a session would.
pub(crate) fn wire(
    hub: &FakeHub,
) -> (CommandQueue<FakeHub>, Arc<ActivityRegistry>, Refresher<FakeHub>) {
    let supervisor = Arc::new(ConnectionSupervisor::new(hub.clone(), "hub.local", hub.client()));
    let queue = CommandQueue::new(supervisor, WATCHDOG);
    let registry = Arc::new(ActivityRegistry::new(hub.0.activities.clone(), &hub.current()));
    let refresher = Refresher::new(queue.clone(), registry.clone());
    (queue, registry, refresher)
}
