//! Connection management for a single Harmony hub.
//!
//! Locates the hub, keeps exactly one live client, and runs every command
//! through a strictly serial queue guarded by a stall watchdog.

pub mod error;
mod handshake;
pub mod locator;
mod pumps;
pub mod queue;
pub mod rpc;
pub mod supervisor;
pub mod types;
pub mod ws_client;

pub use error::HubError;
pub use locator::HubLocator;
pub use queue::{Action, CommandQueue, StallHandler};
pub use rpc::{Connector, HubClient};
pub use supervisor::ConnectionSupervisor;
pub use types::{ConnectionEvent, HubCredentials};
pub use ws_client::{WsClient, WsConnector, WsError};
