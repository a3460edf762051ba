//! Relay subscriptions as cancellable streams.
//!
//! [`RelaySubscriber::subscribe`] opens a connection, sends `REQ` and spawns
//! a reader task. [`RelaySubscriber::listen`] turns the handle into a
//! [`SubscriptionStream`]. Cancelling or dropping the stream sends `CLOSE`
//! and closes the connection.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use provenance_core::WireEvent;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::messages::{ClientMessage, Filter, RelayMessage};
use crate::transport::{parse_endpoint, RelayConnection, RelayConnector, WebSocketConnector};

/// Configuration for subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub connect_timeout: Duration,
    /// Drop inbound events whose id or signature does not verify.
    pub verify_inbound: bool,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            verify_inbound: true,
        }
    }
}

/// A message surfaced to the subscription's consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Event(WireEvent),
    /// The relay has sent everything it had stored; live events follow.
    EndOfStoredEvents,
    /// The relay or the connection ended the subscription.
    Closed { reason: String },
}

/// Sends the cancel signal when dropped.
struct CancelGuard(Option<oneshot::Sender<()>>);

impl CancelGuard {
    fn fire(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

/// A live subscription that has not been consumed yet.
pub struct SubscriptionHandle {
    subscription_id: String,
    endpoint: String,
    filters: Vec<Filter>,
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
    cancel: CancelGuard,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("subscription_id", &self.subscription_id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Single-consumer stream of inbound messages for one subscription.
///
/// Ends after [`InboundMessage::Closed`] or once cancelled.
pub struct SubscriptionStream {
    subscription_id: String,
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
    cancel: CancelGuard,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionStream {
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Stop the subscription and wait until the connection is closed.
    pub async fn cancel(mut self) {
        self.cancel.fire();
        self.receiver.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Stream for SubscriptionStream {
    type Item = InboundMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Opens subscriptions against relays.
pub struct RelaySubscriber<C: RelayConnector = WebSocketConnector> {
    connector: Arc<C>,
    config: SubscriberConfig,
}

impl RelaySubscriber<WebSocketConnector> {
    pub fn websocket(config: SubscriberConfig) -> Self {
        Self::new(Arc::new(WebSocketConnector), config)
    }
}

impl<C: RelayConnector> RelaySubscriber<C> {
    pub fn new(connector: Arc<C>, config: SubscriberConfig) -> Self {
        Self { connector, config }
    }

    /// Connect to `endpoint` and request events matching `filters`.
    ///
    /// An empty filter list subscribes to everything.
    pub async fn subscribe(&self, endpoint: &str, filters: Vec<Filter>) -> Result<SubscriptionHandle> {
        parse_endpoint(endpoint)?;
        let filters = if filters.is_empty() {
            vec![Filter::new()]
        } else {
            filters
        };

        let mut conn = timeout(self.config.connect_timeout, self.connector.connect(endpoint))
            .await
            .map_err(|_| RelayError::Timeout(format!("connecting to {endpoint}")))??;

        let subscription_id = Uuid::new_v4().simple().to_string();
        conn.send(&ClientMessage::Req {
            subscription_id: subscription_id.clone(),
            filters: filters.clone(),
        })
        .await?;
        debug!(endpoint, subscription_id = %subscription_id, "subscribed");

        let (tx, receiver) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(pump(
            conn,
            Reader {
                subscription_id: subscription_id.clone(),
                endpoint: endpoint.to_string(),
                filters: filters.clone(),
                verify_inbound: self.config.verify_inbound,
            },
            tx,
            cancel_rx,
        ));

        Ok(SubscriptionHandle {
            subscription_id,
            endpoint: endpoint.to_string(),
            filters,
            receiver,
            cancel: CancelGuard(Some(cancel_tx)),
            task,
        })
    }

    /// Turn a handle into its message stream.
    pub fn listen(&self, handle: SubscriptionHandle) -> SubscriptionStream {
        SubscriptionStream {
            subscription_id: handle.subscription_id,
            receiver: handle.receiver,
            cancel: handle.cancel,
            task: Some(handle.task),
        }
    }
}

struct Reader {
    subscription_id: String,
    endpoint: String,
    filters: Vec<Filter>,
    verify_inbound: bool,
}

impl Reader {
    /// Decide what, if anything, the consumer sees. `Err` ends the subscription.
    fn route(&self, message: RelayMessage) -> std::result::Result<Option<InboundMessage>, String> {
        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } if subscription_id == self.subscription_id => {
                if self.verify_inbound && !event.verify() {
                    warn!(endpoint = %self.endpoint, event_id = %event.id, "dropping event that fails verification");
                    return Ok(None);
                }
                if !self.filters.iter().any(|f| f.matches(&event)) {
                    debug!(endpoint = %self.endpoint, event_id = %event.id, "dropping event outside filters");
                    return Ok(None);
                }
                Ok(Some(InboundMessage::Event(event)))
            }
            RelayMessage::Eose { subscription_id } if subscription_id == self.subscription_id => {
                Ok(Some(InboundMessage::EndOfStoredEvents))
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } if subscription_id == self.subscription_id => Err(message),
            RelayMessage::Notice { message } => {
                warn!(endpoint = %self.endpoint, notice = %message, "relay notice");
                Ok(None)
            }
            other => {
                debug!(endpoint = %self.endpoint, message = ?other, "ignoring message for another subscription");
                Ok(None)
            }
        }
    }
}

async fn pump(
    mut conn: Box<dyn RelayConnection>,
    reader: Reader,
    tx: mpsc::UnboundedSender<InboundMessage>,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut send_close = true;
    loop {
        tokio::select! {
            _ = &mut cancel => break,
            received = conn.recv() => match received {
                Ok(Some(message)) => match reader.route(message) {
                    Ok(Some(inbound)) => {
                        if tx.send(inbound).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(reason) => {
                        let _ = tx.send(InboundMessage::Closed { reason });
                        send_close = false;
                        break;
                    }
                },
                Ok(None) => {
                    let _ = tx.send(InboundMessage::Closed {
                        reason: "connection closed by relay".into(),
                    });
                    return;
                }
                Err(e) => {
                    warn!(endpoint = %reader.endpoint, error = %e, "subscription connection failed");
                    let _ = tx.send(InboundMessage::Closed { reason: e.to_string() });
                    return;
                }
            },
        }
    }

    if send_close {
        let close = ClientMessage::Close {
            subscription_id: reader.subscription_id.clone(),
        };
        if let Err(e) = conn.send(&close).await {
            debug!(endpoint = %reader.endpoint, error = %e, "failed to send CLOSE");
        }
    }
    let _ = conn.close().await;
    debug!(endpoint = %reader.endpoint, subscription_id = %reader.subscription_id, "subscription ended");
}
