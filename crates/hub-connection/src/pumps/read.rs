//! WebSocket read pump: routes responses to their waiting requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use harmonyctl_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};
use harmonyctl_protocol::envelope::Response;

use crate::ws_client::PendingMap;

/// Reads messages from the WebSocket and dispatches them.
///
/// Any incoming frame resets a [`WS_PONG_WAIT`] read deadline; silence past
/// it means the socket is dead. On exit the client is marked disconnected
/// and every pending request is failed by dropping its sender.
pub(crate) async fn read_pump<S>(
    mut read: S,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let pong_deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(pong_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut pong_deadline => {
                warn!("no traffic from hub within read deadline, closing");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        pong_deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_message(&text, &pending);
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Close(_) => {
                                debug!("received close frame");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::Relaxed);
    if let Ok(mut map) = pending.lock() {
        map.clear();
    }
}

/// Handles a text message from the WebSocket.
fn handle_text_message(text: &str, pending: &PendingMap) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return;
    }

    let resp: Response = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!("failed to parse message: {e}");
            return;
        }
    };

    if resp.is_progress() {
        trace!(id = %resp.id, cmd = %resp.cmd, "request in progress");
        return;
    }

    let waiter = pending.lock().ok().and_then(|mut map| map.remove(&resp.id));
    match waiter {
        Some(tx) => {
            let _ = tx.send(resp);
        }
        None => trace!(id = %resp.id, cmd = %resp.cmd, "dropping unsolicited hub message"),
    }
}
