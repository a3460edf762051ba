//! Connection abstraction for relays.
//!
//! The broadcaster and subscriber only see [`RelayConnector`] and
//! [`RelayConnection`]. [`WebSocketConnector`] talks to real relays; the
//! [`memory`] module simulates a relay network for tests.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::error::{RelayError, Result};
use crate::messages::{ClientMessage, RelayMessage};

/// Opens connections to relay endpoints.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn RelayConnection>>;
}

/// One open relay connection.
#[async_trait]
pub trait RelayConnection: Send {
    async fn send(&mut self, message: &ClientMessage) -> Result<()>;

    /// Next message from the relay, or `None` once the relay has closed
    /// the connection.
    async fn recv(&mut self) -> Result<Option<RelayMessage>>;

    async fn close(&mut self) -> Result<()>;
}

/// Parse and check a relay endpoint. Only `ws` and `wss` are accepted.
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint).map_err(|e| RelayError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(RelayError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// Connects to relays over WebSocket (TLS via rustls for `wss`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl RelayConnector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn RelayConnection>> {
        let url = parse_endpoint(endpoint)?;
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| RelayError::Unreachable(e.to_string()))?;
        debug!(endpoint = %url, "connected to relay");
        Ok(Box::new(WebSocketConnection {
            endpoint: url.to_string(),
            stream,
        }))
    }
}

struct WebSocketConnection {
    endpoint: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RelayConnection for WebSocketConnection {
    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let text = message.to_json()?;
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| RelayError::WebSocket(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<RelayMessage>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match RelayMessage::from_json(text.as_str()) {
                    Ok(message) => return Ok(Some(message)),
                    Err(e) => {
                        debug!(endpoint = %self.endpoint, error = %e, "ignoring unparseable relay message");
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| RelayError::WebSocket(e.to_string()))?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(RelayError::WebSocket(e.to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| RelayError::WebSocket(e.to_string()))
    }
}

/// A simulated relay network for tests.
///
/// Each endpoint is given a [`RelayBehaviour`]. Messages pass through the
/// JSON codec in both directions so framing is exercised too.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, MutexGuard};

    use provenance_core::WireEvent;
    use tokio::sync::mpsc;

    use crate::messages::Filter;

    /// How a simulated relay answers `EVENT` messages.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RelayBehaviour {
        /// Store the event and answer `OK true`.
        Accept,
        /// Answer `OK false` with this reason.
        Reject(String),
        /// Never answer.
        Silent,
        /// Refuse the connection.
        Refuse,
        /// Drop the connection instead of answering.
        CloseEarly,
    }

    struct ConnectionState {
        outbox: mpsc::UnboundedSender<String>,
        subscriptions: HashMap<String, Vec<Filter>>,
    }

    struct RelayState {
        behaviour: RelayBehaviour,
        stored: Vec<WireEvent>,
        received: Vec<ClientMessage>,
        connections: HashMap<u64, ConnectionState>,
        connects: usize,
        closed_subscriptions: Vec<String>,
    }

    #[derive(Default)]
    struct NetworkState {
        relays: HashMap<String, RelayState>,
        next_connection: u64,
    }

    /// Shared state for all simulated relays.
    #[derive(Default)]
    pub struct MemoryRelayNetwork {
        state: Mutex<NetworkState>,
    }

    impl MemoryRelayNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn lock(&self) -> MutexGuard<'_, NetworkState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Register (or reconfigure) a relay at `endpoint`.
        pub fn add_relay(&self, endpoint: &str, behaviour: RelayBehaviour) {
            let mut state = self.lock();
            match state.relays.get_mut(endpoint) {
                Some(relay) => relay.behaviour = behaviour,
                None => {
                    state.relays.insert(
                        endpoint.to_string(),
                        RelayState {
                            behaviour,
                            stored: Vec::new(),
                            received: Vec::new(),
                            connections: HashMap::new(),
                            connects: 0,
                            closed_subscriptions: Vec::new(),
                        },
                    );
                }
            }
        }

        /// Events the relay accepted and stored.
        pub fn stored_events(&self, endpoint: &str) -> Vec<WireEvent> {
            self.lock()
                .relays
                .get(endpoint)
                .map(|r| r.stored.clone())
                .unwrap_or_default()
        }

        /// Every client message the relay received, in order.
        pub fn received(&self, endpoint: &str) -> Vec<ClientMessage> {
            self.lock()
                .relays
                .get(endpoint)
                .map(|r| r.received.clone())
                .unwrap_or_default()
        }

        /// Number of successful connections made so far.
        pub fn connection_count(&self, endpoint: &str) -> usize {
            self.lock().relays.get(endpoint).map_or(0, |r| r.connects)
        }

        /// Number of connections currently open.
        pub fn open_connections(&self, endpoint: &str) -> usize {
            self.lock()
                .relays
                .get(endpoint)
                .map_or(0, |r| r.connections.len())
        }

        /// Subscription ids the client closed with `CLOSE`.
        pub fn closed_subscriptions(&self, endpoint: &str) -> Vec<String> {
            self.lock()
                .relays
                .get(endpoint)
                .map(|r| r.closed_subscriptions.clone())
                .unwrap_or_default()
        }

        /// Push a raw relay message to every open connection on `endpoint`.
        pub fn inject(&self, endpoint: &str, message: &RelayMessage) -> Result<()> {
            let text = message.to_json()?;
            if let Some(relay) = self.lock().relays.get(endpoint) {
                for conn in relay.connections.values() {
                    let _ = conn.outbox.send(text.clone());
                }
            }
            Ok(())
        }

        /// Store an event directly, as if another client had published it.
        ///
        /// Live subscriptions on the relay receive it.
        pub fn publish_direct(&self, endpoint: &str, event: WireEvent) -> Result<()> {
            let mut state = self.lock();
            if let Some(relay) = state.relays.get_mut(endpoint) {
                fan_out(relay, &event)?;
                relay.stored.push(event);
            }
            Ok(())
        }

        fn disconnect(&self, endpoint: &str, id: u64) {
            if let Some(relay) = self.lock().relays.get_mut(endpoint) {
                relay.connections.remove(&id);
            }
        }

        fn handle(&self, endpoint: &str, id: u64, message: ClientMessage) -> Result<()> {
            let mut state = self.lock();
            let relay = state
                .relays
                .get_mut(endpoint)
                .ok_or_else(|| RelayError::Unreachable(endpoint.to_string()))?;
            relay.received.push(message.clone());

            let Some(outbox) = relay.connections.get(&id).map(|c| c.outbox.clone()) else {
                return Err(RelayError::Closed);
            };
            let reply = |message: RelayMessage| -> Result<()> {
                let _ = outbox.send(message.to_json()?);
                Ok(())
            };

            match message {
                ClientMessage::Event(event) => match relay.behaviour.clone() {
                    RelayBehaviour::Accept => {
                        reply(RelayMessage::Ok {
                            event_id: event.id.clone(),
                            accepted: true,
                            message: String::new(),
                        })?;
                        fan_out(relay, &event)?;
                        relay.stored.push(event);
                    }
                    RelayBehaviour::Reject(reason) => reply(RelayMessage::Ok {
                        event_id: event.id,
                        accepted: false,
                        message: reason,
                    })?,
                    RelayBehaviour::Silent | RelayBehaviour::Refuse => {}
                    RelayBehaviour::CloseEarly => {
                        relay.connections.remove(&id);
                    }
                },
                ClientMessage::Req {
                    subscription_id,
                    filters,
                } => {
                    for event in relay
                        .stored
                        .iter()
                        .filter(|e| filters.is_empty() || filters.iter().any(|f| f.matches(e)))
                    {
                        reply(RelayMessage::Event {
                            subscription_id: subscription_id.clone(),
                            event: event.clone(),
                        })?;
                    }
                    reply(RelayMessage::Eose {
                        subscription_id: subscription_id.clone(),
                    })?;
                    if let Some(conn) = relay.connections.get_mut(&id) {
                        conn.subscriptions.insert(subscription_id, filters);
                    }
                }
                ClientMessage::Close { subscription_id } => {
                    if let Some(conn) = relay.connections.get_mut(&id) {
                        conn.subscriptions.remove(&subscription_id);
                    }
                    relay.closed_subscriptions.push(subscription_id);
                }
            }
            Ok(())
        }
    }

    fn fan_out(relay: &RelayState, event: &WireEvent) -> Result<()> {
        for conn in relay.connections.values() {
            for (subscription_id, filters) in &conn.subscriptions {
                if filters.is_empty() || filters.iter().any(|f| f.matches(event)) {
                    let message = RelayMessage::Event {
                        subscription_id: subscription_id.clone(),
                        event: event.clone(),
                    };
                    let _ = conn.outbox.send(message.to_json()?);
                }
            }
        }
        Ok(())
    }

    /// Connector that dials into a [`MemoryRelayNetwork`].
    #[derive(Clone)]
    pub struct MemoryConnector {
        network: Arc<MemoryRelayNetwork>,
    }

    impl MemoryConnector {
        pub fn new(network: Arc<MemoryRelayNetwork>) -> Self {
            Self { network }
        }
    }

    #[async_trait]
    impl RelayConnector for MemoryConnector {
        async fn connect(&self, endpoint: &str) -> Result<Box<dyn RelayConnection>> {
            parse_endpoint(endpoint)?;
            let (tx, rx) = mpsc::unbounded_channel();
            let id = {
                let mut state = self.network.lock();
                state.next_connection += 1;
                let id = state.next_connection;
                match state.relays.get_mut(endpoint) {
                    Some(relay) if relay.behaviour != RelayBehaviour::Refuse => {
                        relay.connects += 1;
                        relay.connections.insert(
                            id,
                            ConnectionState {
                                outbox: tx,
                                subscriptions: HashMap::new(),
                            },
                        );
                        id
                    }
                    _ => return Err(RelayError::Unreachable(format!("connection refused: {endpoint}"))),
                }
            };
            Ok(Box::new(MemoryConnection {
                network: self.network.clone(),
                endpoint: endpoint.to_string(),
                id,
                inbox: rx,
                closed: false,
            }))
        }
    }

    struct MemoryConnection {
        network: Arc<MemoryRelayNetwork>,
        endpoint: String,
        id: u64,
        inbox: mpsc::UnboundedReceiver<String>,
        closed: bool,
    }

    #[async_trait]
    impl RelayConnection for MemoryConnection {
        async fn send(&mut self, message: &ClientMessage) -> Result<()> {
            if self.closed {
                return Err(RelayError::Closed);
            }
            let parsed = ClientMessage::from_json(&message.to_json()?)?;
            self.network.handle(&self.endpoint, self.id, parsed)
        }

        async fn recv(&mut self) -> Result<Option<RelayMessage>> {
            match self.inbox.recv().await {
                Some(text) => RelayMessage::from_json(&text).map(Some),
                None => Ok(None),
            }
        }

        async fn close(&mut self) -> Result<()> {
            if !self.closed {
                self.closed = true;
                self.network.disconnect(&self.endpoint, self.id);
            }
            Ok(())
        }
    }

    impl Drop for MemoryConnection {
        fn drop(&mut self) {
            if !self.closed {
                self.network.disconnect(&self.endpoint, self.id);
            }
        }
    }
}
