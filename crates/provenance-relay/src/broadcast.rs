//! Quorum broadcast of one event to many relays.
//!
//! Each endpoint gets its own connection, its own connect timeout and its own
//! acknowledgement timeout. Attempts run concurrently and are folded into a
//! single [`PublishResult`]; nothing here is transactional and partial
//! success is the normal case.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use provenance_core::WireEvent;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::messages::{ClientMessage, RelayMessage};
use crate::transport::{parse_endpoint, RelayConnection, RelayConnector, WebSocketConnector};

/// Grace period for closing a connection after an attempt.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// How a relay that never acknowledges within the ack timeout is counted.
///
/// Relays are not required to answer, so silence is ambiguous. The default
/// treats it as acceptance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    #[default]
    CountAsSuccess,
    CountAsFailure,
}

/// Configuration for broadcast behaviour.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Time allowed to establish each connection.
    pub connect_timeout: Duration,
    /// Time allowed for an `OK` after the event is sent.
    pub ack_timeout: Duration,
    pub timeout_policy: TimeoutPolicy,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(10),
            timeout_policy: TimeoutPolicy::CountAsSuccess,
        }
    }
}

/// Why one endpoint did not count as a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Not a usable `ws`/`wss` URL; no connection was attempted.
    InvalidEndpoint(String),
    /// Connecting failed or did not finish within the connect timeout.
    Unreachable(String),
    /// The relay answered `OK false`.
    Rejected(String),
    /// The connection failed after it was established.
    ConnectionError(String),
    /// The relay closed the connection without answering.
    ConnectionClosed,
    /// No answer within the ack timeout under [`TimeoutPolicy::CountAsFailure`].
    TimedOut,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::InvalidEndpoint(reason) => write!(f, "invalid endpoint: {reason}"),
            FailureReason::Unreachable(reason) => write!(f, "unreachable: {reason}"),
            FailureReason::Rejected(reason) => write!(f, "rejected: {reason}"),
            FailureReason::ConnectionError(reason) => write!(f, "connection error: {reason}"),
            FailureReason::ConnectionClosed => write!(f, "connection closed before acknowledgement"),
            FailureReason::TimedOut => write!(f, "no acknowledgement before timeout"),
        }
    }
}

/// One endpoint that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFailure {
    pub endpoint: String,
    pub reason: FailureReason,
}

/// Aggregate outcome of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub event_id: String,
    /// Endpoints counted as successes, in input order.
    pub success: Vec<String>,
    /// Endpoints counted as failures, in input order.
    pub failure: Vec<RelayFailure>,
    /// Endpoints that never acknowledged, whichever list they were counted in.
    pub timed_out: Vec<String>,
    /// `success.len() >= min_success`.
    pub published: bool,
}

/// What happened on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptOutcome {
    Accepted,
    TimedOut,
    Failed(FailureReason),
}

/// Fans signed events out to relays.
pub struct RelayBroadcaster<C: RelayConnector = WebSocketConnector> {
    connector: Arc<C>,
    config: BroadcastConfig,
}

impl RelayBroadcaster<WebSocketConnector> {
    /// Broadcaster over real WebSocket connections.
    pub fn websocket(config: BroadcastConfig) -> Self {
        Self::new(Arc::new(WebSocketConnector), config)
    }
}

impl<C: RelayConnector> RelayBroadcaster<C> {
    pub fn new(connector: Arc<C>, config: BroadcastConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Override the timeout policy.
    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.config.timeout_policy = policy;
        self
    }

    /// Publish `event` to every endpoint and apply the quorum rule.
    ///
    /// Never fails: per-endpoint errors land in `failure`. Duplicate endpoints
    /// are contacted once. Dropping the returned future drops every
    /// outstanding connection.
    pub async fn publish(
        &self,
        event: &WireEvent,
        endpoints: &[String],
        min_success: usize,
    ) -> PublishResult {
        let mut seen = HashSet::new();
        let mut slots: Vec<(String, Option<FailureReason>)> = Vec::new();
        for endpoint in endpoints {
            // Valid endpoints dedupe on their normalised URL, invalid ones on
            // the trimmed input, so each counts once toward the quorum.
            let (key, invalid) = match parse_endpoint(endpoint) {
                Ok(url) => (url.to_string(), None),
                Err(e) => (
                    endpoint.trim().to_string(),
                    Some(FailureReason::InvalidEndpoint(e.to_string())),
                ),
            };
            if seen.insert(key) {
                slots.push((endpoint.clone(), invalid));
            } else {
                debug!(endpoint = %endpoint, "skipping duplicate endpoint");
            }
        }

        let outcomes = join_all(slots.iter().map(|(endpoint, invalid)| async move {
            match invalid {
                Some(reason) => AttemptOutcome::Failed(reason.clone()),
                None => self.attempt(event, endpoint).await,
            }
        }))
        .await;

        let mut result = PublishResult {
            event_id: event.id.clone(),
            success: Vec::new(),
            failure: Vec::new(),
            timed_out: Vec::new(),
            published: false,
        };
        for ((endpoint, _), outcome) in slots.into_iter().zip(outcomes) {
            match outcome {
                AttemptOutcome::Accepted => result.success.push(endpoint),
                AttemptOutcome::TimedOut => {
                    result.timed_out.push(endpoint.clone());
                    match self.config.timeout_policy {
                        TimeoutPolicy::CountAsSuccess => result.success.push(endpoint),
                        TimeoutPolicy::CountAsFailure => result.failure.push(RelayFailure {
                            endpoint,
                            reason: FailureReason::TimedOut,
                        }),
                    }
                }
                AttemptOutcome::Failed(reason) => {
                    warn!(endpoint = %endpoint, event_id = %event.id, %reason, "relay publish failed");
                    result.failure.push(RelayFailure { endpoint, reason });
                }
            }
        }
        result.published = result.success.len() >= min_success;

        info!(
            event_id = %event.id,
            success = result.success.len(),
            failure = result.failure.len(),
            timed_out = result.timed_out.len(),
            min_success,
            published = result.published,
            "broadcast finished"
        );
        result
    }

    async fn attempt(&self, event: &WireEvent, endpoint: &str) -> AttemptOutcome {
        let mut conn = match timeout(self.config.connect_timeout, self.connector.connect(endpoint)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return AttemptOutcome::Failed(FailureReason::Unreachable(e.to_string())),
            Err(_) => {
                return AttemptOutcome::Failed(FailureReason::Unreachable(format!(
                    "no connection after {:?}",
                    self.config.connect_timeout
                )))
            }
        };

        let outcome = match conn.send(&ClientMessage::Event(event.clone())).await {
            Ok(()) => match timeout(self.config.ack_timeout, await_ack(conn.as_mut(), &event.id)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!(endpoint = %endpoint, "no acknowledgement before timeout");
                    AttemptOutcome::TimedOut
                }
            },
            Err(e) => AttemptOutcome::Failed(FailureReason::ConnectionError(e.to_string())),
        };

        let _ = timeout(CLOSE_GRACE, conn.close()).await;
        outcome
    }
}

/// Read until the relay answers for `event_id`.
async fn await_ack(conn: &mut dyn RelayConnection, event_id: &str) -> AttemptOutcome {
    loop {
        match conn.recv().await {
            Ok(Some(RelayMessage::Ok {
                event_id: id,
                accepted,
                message,
            })) if id == event_id => {
                return if accepted {
                    AttemptOutcome::Accepted
                } else {
                    AttemptOutcome::Failed(FailureReason::Rejected(message))
                };
            }
            Ok(Some(RelayMessage::Notice { message })) => {
                warn!(notice = %message, "relay notice while publishing");
            }
            Ok(Some(_)) => {}
            Ok(None) => return AttemptOutcome::Failed(FailureReason::ConnectionClosed),
            Err(e) => return AttemptOutcome::Failed(FailureReason::ConnectionError(e.to_string())),
        }
    }
}
