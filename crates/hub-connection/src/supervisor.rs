//! Owner of the single live hub client.
//!
//! The client is replaced, never mutated, on reconnect; the previous one is
//! dropped without an explicit close.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{error, info, trace, warn};

use crate::error::HubError;
use crate::rpc::{Connector, HubClient};
use crate::types::ConnectionEvent;

/// Supervises the connection to one hub.
pub struct ConnectionSupervisor<K: Connector> {
    connector: K,
    address: String,
    current: RwLock<Arc<K::Client>>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
}

impl<K: Connector> ConnectionSupervisor<K> {
    /// Wraps an already connected client.
    pub fn new(connector: K, address: impl Into<String>, client: K::Client) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        let address = address.into();

        let supervisor = Self {
            connector,
            address: address.clone(),
            current: RwLock::new(Arc::new(client)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        };
        supervisor.emit(ConnectionEvent::Connected { address });
        supervisor
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Address of the supervised hub.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the live client. Callers must not keep it across commands.
    pub async fn current(&self) -> Arc<K::Client> {
        self.current.read().await.clone()
    }

    /// Opens a fresh connection and makes it current.
    ///
    /// On failure the previous client stays current and the error is
    /// returned to the caller.
    pub async fn reconnect(&self) -> Result<Arc<K::Client>, HubError> {
        info!(address = %self.address, "reconnecting to hub");

        match self.connector.connect(&self.address).await {
            Ok(client) => {
                let client = Arc::new(client);
                *self.current.write().await = client.clone();
                info!(address = %self.address, "reconnected to hub");
                self.emit(ConnectionEvent::Reconnected {
                    address: self.address.clone(),
                });
                Ok(client)
            }
            Err(e) => {
                error!(address = %self.address, error = %e, "failed to reconnect to hub");
                self.emit(ConnectionEvent::ReconnectFailed {
                    address: self.address.clone(),
                    error: e.to_string(),
                });
                Err(HubError::Reconnect {
                    address: self.address.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Returns the live client, first replacing it if it is known dead.
    ///
    /// A failed replacement still hands out the dead client; its calls
    /// fail fast and the failure has already been escalated.
    pub async fn current_or_reconnect(&self) -> Arc<K::Client> {
        let client = self.current().await;
        if client.is_connected() {
            return client;
        }

        warn!(address = %self.address, "hub connection lost");
        self.reconnect().await.unwrap_or(client)
    }

    #[cfg(test)]
    pub(crate) fn connector(&self) -> &K {
        &self.connector
    }

    pub(crate) fn note_stall(&self, task: &str) {
        self.emit(ConnectionEvent::Stalled {
            task: task.to_string(),
        });
    }

    fn emit(&self, event: ConnectionEvent) {
        // Never block the queue on a slow or absent consumer.
        if let Err(e) = self.events_tx.try_send(event) {
            trace!("connection event not delivered: {e}");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;

    use harmonyctl_protocol::{Activity, ActivityId};

    /// Client tagged with the connection generation that produced it.
    #[derive(Debug)]
    pub(crate) struct TaggedClient {
        pub(crate) generation: usize,
        pub(crate) alive: AtomicBool,
    }

    impl HubClient for TaggedClient {
        fn list_activities(&self) -> BoxFuture<'_, Result<Vec<Activity>, HubError>> {
            async { Ok(vec![]) }.boxed()
        }
        fn current_activity(&self) -> BoxFuture<'_, Result<ActivityId, HubError>> {
            async { Ok(ActivityId::off()) }.boxed()
        }
        fn start_activity<'a>(&'a self, _: &'a ActivityId) -> BoxFuture<'a, Result<(), HubError>> {
            async { Ok(()) }.boxed()
        }
        fn is_connected(&self) -> bool {
            self.alive.load(Ordering::Relaxed)
        }
    }

    /// Connector that hands out generations 1, 2, ... and can be told to
    /// refuse upcoming attempts.
    #[derive(Default)]
    pub(crate) struct CountingConnector {
        pub(crate) attempts: AtomicUsize,
        pub(crate) refusals: std::sync::Mutex<VecDeque<bool>>,
    }

    impl CountingConnector {
        pub(crate) fn initial() -> TaggedClient {
            TaggedClient {
                generation: 0,
                alive: AtomicBool::new(true),
            }
        }
    }

    impl Connector for CountingConnector {
        type Client = TaggedClient;

        fn connect<'a>(&'a self, _address: &'a str) -> BoxFuture<'a, Result<TaggedClient, HubError>> {
            async move {
                let generation = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let refuse = self.refusals.lock().unwrap().pop_front().unwrap_or(false);
                if refuse {
                    return Err(HubError::Closed);
                }
                Ok(TaggedClient {
                    generation,
                    alive: AtomicBool::new(true),
                })
            }
            .boxed()
        }
    }

    fn supervisor() -> ConnectionSupervisor<CountingConnector> {
        ConnectionSupervisor::new(
            CountingConnector::default(),
            "10.0.0.8",
            CountingConnector::initial(),
        )
    }

    #[tokio::test]
    async fn reconnect_replaces_current() {
        let sup = supervisor();
        assert_eq!(sup.current().await.generation, 0);

        sup.reconnect().await.unwrap();
        assert_eq!(sup.current().await.generation, 1);
    }

    #[tokio::test]
    async fn failed_reconnect_keeps_previous_client() {
        let sup = supervisor();
        sup.connector.refusals.lock().unwrap().push_back(true);

        let err = sup.reconnect().await.unwrap_err();
        assert!(matches!(err, HubError::Reconnect { .. }));
        assert_eq!(sup.current().await.generation, 0);
    }

    #[tokio::test]
    async fn events_report_lifecycle() {
        let sup = supervisor();
        let mut events = sup.take_events().await.unwrap();
        assert!(sup.take_events().await.is_none());

        sup.reconnect().await.unwrap();
        sup.connector.refusals.lock().unwrap().push_back(true);
        let _ = sup.reconnect().await;

        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::Connected {
                address: "10.0.0.8".into()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::Reconnected {
                address: "10.0.0.8".into()
            }
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::ReconnectFailed { .. }
        ));
    }

    #[tokio::test]
    async fn dead_client_is_replaced_lazily() {
        let sup = supervisor();
        assert_eq!(sup.current_or_reconnect().await.generation, 0);
        assert_eq!(sup.connector.attempts.load(Ordering::SeqCst), 0);

        sup.current().await.alive.store(false, Ordering::Relaxed);
        assert_eq!(sup.current_or_reconnect().await.generation, 1);
    }

    #[tokio::test]
    async fn dead_client_survives_failed_replacement() {
        let sup = supervisor();
        sup.current().await.alive.store(false, Ordering::Relaxed);
        sup.connector.refusals.lock().unwrap().push_back(true);

        let client = sup.current_or_reconnect().await;
        assert_eq!(client.generation, 0);
    }
}
