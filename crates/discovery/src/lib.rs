pub mod client;
pub mod types;

// Re-export primary types.
pub use client::Client;
pub use types::{DiscoveredHub, DiscoveryEvent, EventType};

/// Errors for discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("discovery client was stopped")]
    Stopped,
}
