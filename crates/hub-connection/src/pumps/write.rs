//! WebSocket write pump: serialises outbound messages and sends keepalive pings.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

/// Writes queued messages to the WebSocket, pinging every `ping_period`.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    ping_period: Duration,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut ping = tokio::time::interval(ping_period);
    ping.tick().await; // Skip immediate first tick.

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ping.tick() => {
                trace!("sending ping");
                tungstenite::Message::Ping(vec![].into())
            }
            msg = write_rx.recv() => match msg {
                Some(m) => m,
                None => break,
            },
        };

        if let Err(e) = write.send(msg).await {
            error!("WebSocket write error: {e}");
            break;
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    fn channel_sink(
        tx: mpsc::Sender<tungstenite::Message>,
    ) -> impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    #[tokio::test]
    async fn write_pump_stops_on_cancel() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let cancel = CancellationToken::new();

        let (_write_tx, write_rx) = mpsc::channel(16);
        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            write_pump(channel_sink(sink_tx), write_rx, Duration::from_secs(60), c).await;
        });

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        let close_msg = sink_rx.recv().await;
        assert!(matches!(close_msg, Some(tungstenite::Message::Close(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn write_pump_pings_periodically() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let cancel = CancellationToken::new();
        let (write_tx, write_rx) = mpsc::channel(16);

        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            write_pump(channel_sink(sink_tx), write_rx, Duration::from_secs(5), c).await;
        });

        write_tx
            .send(tungstenite::Message::Text("hello".into()))
            .await
            .unwrap();
        assert!(matches!(
            sink_rx.recv().await,
            Some(tungstenite::Message::Text(_))
        ));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(matches!(
            sink_rx.recv().await,
            Some(tungstenite::Message::Ping(_))
        ));

        cancel.cancel();
        handle.await.unwrap();
    }
}
