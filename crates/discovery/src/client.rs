use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use harmonyctl_protocol::constants::{
    DISCOVERY_PING_INTERVAL, DISCOVERY_PING_PORT, DISCOVERY_SERVICE,
};

use crate::DiscoveryError;
use crate::types::{DiscoveredHub, DiscoveryEvent, EventType};

/// Largest advertisement accepted from a hub.
const MAX_ADVERT_SIZE: u64 = 4096;

/// Time a hub gets to write its advertisement after connecting.
const ADVERT_READ_TIMEOUT: Duration = Duration::from_secs(5);

type HubMap = Arc<RwLock<HashMap<String, DiscoveredHub>>>;

/// Discovers hubs on the local network.
///
/// Hubs do not announce themselves unprompted: the client broadcasts a
/// UDP ping naming a local TCP port, and each hub that hears it connects
/// back to that port and writes a `key:value;...` advertisement.
pub struct Client {
    port: u16,
    ping_target: SocketAddr,
    ping_interval: Duration,
    hubs: HubMap,
    events_tx: mpsc::Sender<DiscoveryEvent>,
    events_rx: Option<mpsc::Receiver<DiscoveryEvent>>,
    cancel: CancellationToken,
}

impl Client {
    /// Creates a discovery client that will listen for answers on `port`.
    pub fn new(port: u16) -> Self {
        let (tx, rx) = mpsc::channel(16);
        Self {
            port,
            ping_target: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DISCOVERY_PING_PORT),
            ping_interval: DISCOVERY_PING_INTERVAL,
            hubs: Arc::new(RwLock::new(HashMap::new())),
            events_tx: tx,
            events_rx: Some(rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides where discovery pings are sent.
    pub fn set_ping_target(&mut self, target: SocketAddr) {
        self.ping_target = target;
    }

    /// Sets how often the ping is repeated.
    pub fn set_ping_interval(&mut self, interval: Duration) {
        self.ping_interval = interval;
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<DiscoveryEvent>> {
        self.events_rx.take()
    }

    /// Starts listening for hub advertisements and pinging the network.
    ///
    /// Returns the bound listener address once both sockets are ready;
    /// the work continues in background tasks until [`stop`](Self::stop).
    pub async fn start(&self) -> Result<SocketAddr, DiscoveryError> {
        if self.cancel.is_cancelled() {
            return Err(DiscoveryError::Stopped);
        }

        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.port))
            .await
            .map_err(|source| DiscoveryError::Bind {
                port: self.port,
                source,
            })?;
        let local = listener.local_addr()?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;

        info!(port = local.port(), "listening for hub advertisements");

        tokio::spawn(accept_loop(
            listener,
            self.hubs.clone(),
            self.events_tx.clone(),
            self.cancel.clone(),
        ));
        tokio::spawn(ping_loop(
            socket,
            self.ping_target,
            ping_payload(local.port()),
            self.ping_interval,
            self.cancel.clone(),
        ));

        Ok(local)
    }

    /// Stops listening and pinging.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Returns all hubs seen so far.
    pub fn get_hubs(&self) -> Vec<DiscoveredHub> {
        self.hubs
            .read()
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn ping_payload(port: u16) -> Vec<u8> {
    format!("{DISCOVERY_SERVICE}\n{port}").into_bytes()
}

async fn ping_loop(
    socket: UdpSocket,
    target: SocketAddr,
    payload: Vec<u8>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = socket.send_to(&payload, target).await {
                    debug!(%target, error = %e, "discovery ping failed");
                } else {
                    trace!(%target, "sent discovery ping");
                }
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    hubs: HubMap,
    events_tx: mpsc::Sender<DiscoveryEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(handle_advert(stream, peer, hubs.clone(), events_tx.clone()));
                    }
                    Err(e) => warn!(error = %e, "failed to accept hub connection"),
                }
            }
        }
    }
    debug!("discovery listener stopped");
}

async fn handle_advert(
    stream: TcpStream,
    peer: SocketAddr,
    hubs: HubMap,
    events_tx: mpsc::Sender<DiscoveryEvent>,
) {
    let mut buf = Vec::new();
    let read = tokio::time::timeout(
        ADVERT_READ_TIMEOUT,
        stream.take(MAX_ADVERT_SIZE).read_to_end(&mut buf),
    )
    .await;

    match read {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "failed to read advertisement");
            return;
        }
        // Keep whatever arrived before the deadline.
        Err(_) => trace!(%peer, "advertisement read timed out"),
    }

    let text = String::from_utf8_lossy(&buf);
    let Some(hub) = DiscoveredHub::parse(&text, Some(peer.ip())) else {
        debug!(%peer, "ignoring unparseable advertisement");
        return;
    };

    if let Some(event) = record_hub(&hubs, hub) {
        let _ = events_tx.send(event).await;
    }
}

/// Tracks a hub, returning the event to publish (if any).
fn record_hub(hubs: &HubMap, hub: DiscoveredHub) -> Option<DiscoveryEvent> {
    let Ok(mut known) = hubs.write() else {
        return None;
    };

    let event_type = match known.get_mut(hub.key()) {
        Some(existing) if existing.ip == hub.ip => return None,
        Some(existing) => {
            existing.ip = hub.ip.clone();
            EventType::Updated
        }
        None => {
            known.insert(hub.key().to_string(), hub.clone());
            EventType::Discovered
        }
    };

    info!(hub = %hub.display_name(), ip = %hub.ip, "{event_type} hub");
    Some(DiscoveryEvent { event_type, hub })
}
