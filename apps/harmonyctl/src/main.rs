//! harmonyctl entry point.

mod config;
mod console;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use harmonyctl_activity::HubSession;
use harmonyctl_hub_connection::{ConnectionEvent, WsConnector};

use crate::config::HarmonyConfig;

#[derive(Parser)]
#[command(name = "harmonyctl", version, about = "Control a Logitech Harmony hub")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Hub address; skips discovery
    #[arg(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,harmonyctl=debug")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting harmonyctl");

    let mut config = match HarmonyConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            HarmonyConfig::default()
        }
    };
    if let Some(address) = cli.address {
        config.ip_address = Some(address);
    }
    if config.email.is_empty() {
        tracing::warn!("no hub credentials configured");
    }

    let session_config = config.session_config();
    if session_config.address.is_none() {
        tracing::info!(
            port = session_config.discovery_port,
            "looking for a hub on the local network"
        );
    }

    let connector = WsConnector::new(config.credentials()).with_port(config.port);
    let session = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted before a hub was found");
            return Ok(());
        }
        session = HubSession::start(session_config, connector) => {
            session.context("failed to start hub session")?
        }
    };

    println!("connected to hub at {}", session.address());
    console::print_records(&session);
    watch_session(&session).await;

    console::run(&session).await?;
    session.shutdown();
    Ok(())
}

/// Logs activity state changes and connection events in the background.
async fn watch_session<K: harmonyctl_hub_connection::Connector>(session: &HubSession<K>) {
    let mut changes = session.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(record) if record.is_on => {
                    tracing::info!(activity = %record.id, label = %record.label, "activity is on");
                }
                Ok(record) => {
                    tracing::trace!(activity = %record.id, "activity is off");
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "activity notifications skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let Some(mut events) = session.take_connection_events().await else {
        return;
    };
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Connected { address } | ConnectionEvent::Reconnected { address } => {
                    tracing::info!(%address, "hub connection established");
                }
                ConnectionEvent::Stalled { task } => {
                    tracing::warn!(%task, "hub stopped responding");
                }
                ConnectionEvent::ReconnectFailed { address, error } => {
                    tracing::error!(%address, %error, "could not reconnect to hub");
                }
            }
        }
    });
}
