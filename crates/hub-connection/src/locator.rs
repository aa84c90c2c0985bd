//! Finds the hub and opens the first connection to it.

use tokio::sync::mpsc;
use tracing::{debug, info};

use harmonyctl_discovery::{
    Client as DiscoveryClient, DiscoveredHub, DiscoveryError, DiscoveryEvent, EventType,
};
use harmonyctl_protocol::constants::DISCOVERY_PORT;

use crate::error::HubError;
use crate::rpc::Connector;

/// Resolves the hub address, from configuration or from the network.
#[derive(Debug, Clone)]
pub struct HubLocator {
    address: Option<String>,
    discovery_port: u16,
}

impl HubLocator {
    /// Uses `address` when given, otherwise listens for an advertisement.
    pub fn new(address: Option<String>) -> Self {
        Self {
            address: address.filter(|a| !a.trim().is_empty()),
            discovery_port: DISCOVERY_PORT,
        }
    }

    /// Overrides the local port hubs answer discovery pings on.
    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery_port = port;
        self
    }

    /// Returns a connected client and the address it was reached at.
    ///
    /// Discovery waits indefinitely for the first hub and ignores every
    /// later one. A connect failure is returned as-is; there is no retry
    /// at this layer.
    pub async fn locate<K: Connector>(
        &self,
        connector: &K,
    ) -> Result<(K::Client, String), HubError> {
        let address = match &self.address {
            Some(address) => {
                info!(%address, "using hub address from configuration");
                address.clone()
            }
            None => self.discover().await?,
        };

        let client = connector.connect(&address).await?;
        info!(%address, "connected to hub");
        Ok((client, address))
    }

    async fn discover(&self) -> Result<String, HubError> {
        info!(port = self.discovery_port, "searching for hubs");

        let mut discovery = DiscoveryClient::new(self.discovery_port);
        let mut events = discovery
            .take_events()
            .ok_or(HubError::Discovery(DiscoveryError::Stopped))?;
        discovery.start().await?;

        let found = first_hub(&mut events).await;

        // Only the first hub is used.
        discovery.stop();

        let hub = found?;
        info!(hub = %hub.display_name(), ip = %hub.ip, "found hub");
        Ok(hub.ip)
    }
}

/// Waits for the first newly discovered hub. Updates are skipped.
async fn first_hub(
    events: &mut mpsc::Receiver<DiscoveryEvent>,
) -> Result<DiscoveredHub, HubError> {
    while let Some(event) = events.recv().await {
        if event.event_type == EventType::Discovered {
            return Ok(event.hub);
        }
        debug!(hub = %event.hub.display_name(), "ignoring hub update");
    }
    Err(HubError::Discovery(DiscoveryError::Stopped))
}
