//! The seam between the session core and whatever speaks to the hub.

use futures_util::future::BoxFuture;

use harmonyctl_protocol::{Activity, ActivityId};

use crate::error::HubError;

/// Remote procedures offered by a connected hub.
///
/// Every call may fail, and may also never complete; callers bound them
/// with the command queue's watchdog rather than relying on the client.
pub trait HubClient: Send + Sync + 'static {
    fn list_activities(&self) -> BoxFuture<'_, Result<Vec<Activity>, HubError>>;

    fn current_activity(&self) -> BoxFuture<'_, Result<ActivityId, HubError>>;

    fn start_activity<'a>(&'a self, id: &'a ActivityId) -> BoxFuture<'a, Result<(), HubError>>;

    /// False once the client knows its transport is gone.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Produces authenticated clients for a hub address.
pub trait Connector: Send + Sync + 'static {
    type Client: HubClient;

    fn connect<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<Self::Client, HubError>>;
}
