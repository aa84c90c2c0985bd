//! WebSocket client for the hub's local API.
//!
//! Implements request-response with UUID correlation, ping keepalive,
//! and dead-socket detection. Unsolicited hub notifications are dropped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::FutureExt;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use harmonyctl_protocol::constants::{
    WS_CONNECT_TIMEOUT, WS_DEFAULT_PORT, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, cmd,
};
use harmonyctl_protocol::envelope::{Request, Response};
use harmonyctl_protocol::messages::{
    ConfigResponse, CurrentActivityResponse, RunActivityRequest,
};
use harmonyctl_protocol::{Activity, ActivityId};

use crate::error::HubError;
use crate::rpc::{Connector, HubClient};
use crate::types::HubCredentials;

/// Errors from the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request timed out")]
    Timeout,

    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    #[error("connection closed")]
    Closed,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("hub error {code}: {message}")]
    Hub { code: u16, message: String },
}

/// Requests awaiting a response, keyed by request id.
pub(crate) type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Response>>>>;

/// WebSocket client connected to a single hub.
pub struct WsClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    pending: PendingMap,
    /// Cleared by the read pump once the socket is gone.
    connected: Arc<AtomicBool>,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl WsClient {
    /// Connects to a hub WebSocket and performs the credentialed handshake.
    pub async fn connect(url: &str, credentials: &HubCredentials) -> Result<Self, WsError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

        let (ws_stream, _) = tokio::time::timeout(
            WS_CONNECT_TIMEOUT,
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false),
        )
        .await
        .map_err(|_| WsError::ConnectTimeout(url.to_string()))??;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(64);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let write_handle = tokio::spawn(crate::pumps::write::write_pump(
            write,
            write_rx,
            WS_PING_PERIOD,
            cancel.clone(),
        ));

        let read_handle = tokio::spawn(crate::pumps::read::read_pump(
            read,
            pending.clone(),
            connected.clone(),
            write_tx.clone(),
            cancel.clone(),
        ));

        let client = Self {
            write_tx,
            pending,
            connected,
            _read_handle: read_handle,
            _write_handle: write_handle,
            cancel,
        };

        crate::handshake::perform_handshake(&client, credentials).await?;
        Ok(client)
    }

    /// Sends a request and waits for its final response.
    ///
    /// With `timeout == None` the wait is unbounded; abandoning the returned
    /// future discards the pending entry so a late reply is dropped.
    pub async fn send_request<T: serde::Serialize>(
        &self,
        command: &str,
        params: Option<&T>,
        timeout: Option<Duration>,
    ) -> Result<Response, WsError> {
        if !self.is_connected() {
            return Err(WsError::Closed);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let request = Request::new(&id, command, params)?;
        let json = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        let _guard = PendingGuard::insert(&self.pending, &id, tx);

        self.write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|_| WsError::Closed)?;

        let resp = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| WsError::Timeout)?,
            None => rx.await,
        }
        .map_err(|_| WsError::Closed)?;

        if !resp.is_ok() {
            return Err(WsError::Hub {
                code: resp.code,
                message: resp.msg.clone(),
            });
        }
        Ok(resp)
    }

    /// Returns false once the socket has closed or gone silent.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
    }
}

/// Removes a pending entry when the waiting request finishes or is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: String,
}

impl<'a> PendingGuard<'a> {
    fn insert(pending: &'a PendingMap, id: &str, tx: oneshot::Sender<Response>) -> Self {
        if let Ok(mut map) = pending.lock() {
            map.insert(id.to_string(), tx);
        }
        Self {
            pending,
            id: id.to_string(),
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut map) = self.pending.lock() {
            map.remove(&self.id);
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl HubClient for WsClient {
    fn list_activities(&self) -> BoxFuture<'_, Result<Vec<Activity>, HubError>> {
        async move {
            let resp = self.send_request::<()>(cmd::GET_CONFIG, None, None).await?;
            let config = resp
                .parse_data::<ConfigResponse>()?
                .ok_or_else(|| HubError::Protocol("empty hub configuration".into()))?;
            Ok(config.activity)
        }
        .boxed()
    }

    fn current_activity(&self) -> BoxFuture<'_, Result<ActivityId, HubError>> {
        async move {
            let resp = self
                .send_request::<()>(cmd::GET_CURRENT_ACTIVITY, None, None)
                .await?;
            let current = resp
                .parse_data::<CurrentActivityResponse>()?
                .ok_or_else(|| HubError::Protocol("empty current activity".into()))?;
            Ok(current.result)
        }
        .boxed()
    }

    fn start_activity<'a>(&'a self, id: &'a ActivityId) -> BoxFuture<'a, Result<(), HubError>> {
        async move {
            let req = RunActivityRequest::start(id.clone(), now_millis());
            self.send_request(cmd::RUN_ACTIVITY, Some(&req), None)
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn is_connected(&self) -> bool {
        WsClient::is_connected(self)
    }
}

/// Connects [`WsClient`]s with a fixed set of credentials.
#[derive(Debug, Clone)]
pub struct WsConnector {
    credentials: HubCredentials,
    port: u16,
}

impl WsConnector {
    pub fn new(credentials: HubCredentials) -> Self {
        Self {
            credentials,
            port: WS_DEFAULT_PORT,
        }
    }

    /// Overrides the WebSocket port used when an address carries none.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builds the WebSocket URL for a hub address.
    pub fn url_for(&self, address: &str) -> String {
        if address.parse::<SocketAddr>().is_ok() {
            format!("ws://{address}/")
        } else {
            format!("ws://{address}:{}/", self.port)
        }
    }
}

impl Connector for WsConnector {
    type Client = WsClient;

    fn connect<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<WsClient, HubError>> {
        async move {
            let url = self.url_for(address);
            info!(%url, "connecting to hub");
            let client = WsClient::connect(&url, &self.credentials).await?;
            debug!(%url, "hub handshake complete");
            Ok(client)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> (WsClient, mpsc::Receiver<tungstenite::Message>) {
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(16);
        let client = WsClient {
            write_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(true)),
            _read_handle: tokio::spawn(async {}),
            _write_handle: tokio::spawn(async {}),
            cancel: CancellationToken::new(),
        };
        (client, write_rx)
    }

    fn sent_request(msg: tungstenite::Message) -> Request {
        match msg {
            tungstenite::Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn ws_error_display() {
        assert_eq!(WsError::Timeout.to_string(), "request timed out");
        assert_eq!(WsError::Closed.to_string(), "connection closed");
        let err = WsError::Hub {
            code: 503,
            message: "busy".into(),
        };
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn url_for_appends_default_port() {
        let conn = WsConnector::new(HubCredentials::default());
        assert_eq!(conn.url_for("192.168.1.9"), "ws://192.168.1.9:8088/");
        assert_eq!(conn.url_for("192.168.1.9:9000"), "ws://192.168.1.9:9000/");
        assert_eq!(conn.with_port(1).url_for("hub.local"), "ws://hub.local:1/");
    }

    #[tokio::test]
    async fn current_activity_round_trip() {
        let (client, mut write_rx) = test_client();
        let pending = client.pending.clone();

        let responder = tokio::spawn(async move {
            let req = sent_request(write_rx.recv().await.unwrap());
            assert_eq!(req.cmd, cmd::GET_CURRENT_ACTIVITY);
            let resp: Response = serde_json::from_value(serde_json::json!({
                "id": req.id, "code": 200, "data": {"result": "31"}
            }))
            .unwrap();
            let tx = pending.lock().unwrap().remove(&req.id).unwrap();
            tx.send(resp).unwrap();
        });

        let current = client.current_activity().await.unwrap();
        assert_eq!(current.as_str(), "31");
        responder.await.unwrap();
        assert!(client.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_activity_surfaces_hub_rejection() {
        let (client, mut write_rx) = test_client();
        let pending = client.pending.clone();

        tokio::spawn(async move {
            let req = sent_request(write_rx.recv().await.unwrap());
            let params: serde_json::Value =
                serde_json::from_str(req.params.unwrap().get()).unwrap();
            assert_eq!(params["activityId"], "7");
            let resp: Response = serde_json::from_value(serde_json::json!({
                "id": req.id, "code": 400, "msg": "invalid activity"
            }))
            .unwrap();
            let tx = pending.lock().unwrap().remove(&req.id).unwrap();
            let _ = tx.send(resp);
        });

        let err = client.start_activity(&"7".into()).await.unwrap_err();
        assert!(matches!(err, HubError::Rpc { code: 400, .. }));
    }

    #[tokio::test]
    async fn abandoned_request_clears_pending() {
        let (client, _write_rx) = test_client();
        let fut = client.current_activity();
        let _ = tokio::time::timeout(Duration::from_millis(20), fut).await;
        assert!(client.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disconnected_client_fails_fast() {
        let (client, _write_rx) = test_client();
        client.connected.store(false, Ordering::Relaxed);
        assert!(!HubClient::is_connected(&client));
        let err = client.list_activities().await.unwrap_err();
        assert!(matches!(err, HubError::Closed));
    }

    #[tokio::test]
    async fn timed_request_expires() {
        tokio::time::pause();
        let (client, _write_rx) = test_client();
        let err = client
            .send_request::<()>(cmd::GET_CONFIG, None, Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, WsError::Timeout));
    }
}
