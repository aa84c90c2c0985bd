//! Error taxonomy for hub sessions.

use harmonyctl_discovery::DiscoveryError;

use crate::ws_client::WsError;

/// Errors surfaced to whoever enqueued a command.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// No hub could be located or the initial connect was refused.
    #[error("hub discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// The hub answered but rejected the request.
    #[error("hub rejected request ({code}): {message}")]
    Rpc { code: u16, message: String },

    /// The command's watchdog expired before the hub answered.
    #[error("set activity failed too many times")]
    Stalled,

    /// The hub never answered the startup queries.
    #[error("hub did not answer during startup")]
    StartupTimeout,

    /// A fresh connection could not be established after a stall.
    #[error("failed to reconnect to hub at {address}: {source}")]
    Reconnect {
        address: String,
        #[source]
        source: Box<HubError>,
    },

    #[error("transport error: {0}")]
    Transport(WsError),

    #[error("connection closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<WsError> for HubError {
    fn from(e: WsError) -> Self {
        match e {
            WsError::Hub { code, message } => HubError::Rpc { code, message },
            WsError::Closed => HubError::Closed,
            other => HubError::Transport(other),
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        HubError::Protocol(e.to_string())
    }
}
