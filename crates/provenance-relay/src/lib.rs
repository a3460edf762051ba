//! # Provenance Relay
//!
//! NIP-01 relay plumbing: message framing, connections, quorum broadcast and
//! cancellable subscriptions. This crate never sees key material; it only
//! moves already-signed [`WireEvent`](provenance_core::WireEvent)s.
//!
//! ## Key Types
//!
//! - [`RelayBroadcaster`] - Publishes one event to many relays against a quorum
//! - [`PublishResult`] - Aggregate accept/reject/timeout outcome of a broadcast
//! - [`TimeoutPolicy`] - How silent relays are counted
//! - [`RelaySubscriber`] - Opens subscriptions and yields [`SubscriptionStream`]s
//! - [`ClientMessage`] / [`RelayMessage`] / [`Filter`] - The NIP-01 message set
//! - [`RelayConnector`] - Transport seam; WebSocket and in-memory implementations
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provenance_core::WireEvent;
//! use provenance_relay::{BroadcastConfig, RelayBroadcaster};
//!
//! async fn announce(event: &WireEvent) {
//!     let broadcaster = RelayBroadcaster::websocket(BroadcastConfig::default());
//!     let endpoints = vec!["wss://relay.one".to_string(), "wss://relay.two".to_string()];
//!     let result = broadcaster.publish(event, &endpoints, 1).await;
//!     if !result.published {
//!         for failure in &result.failure {
//!             eprintln!("{}: {}", failure.endpoint, failure.reason);
//!         }
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Best effort**: no rollback and no atomicity across endpoints
//! - **Independent attempts**: each endpoint has its own connect and ack timeout
//! - **Silence is a policy**: see [`TimeoutPolicy`]
//! - **Filtering at subscribe time**: messages for other subscriptions never
//!   reach a stream

pub mod broadcast;
pub mod error;
pub mod messages;
pub mod subscriber;
pub mod transport;

pub use broadcast::{
    BroadcastConfig, FailureReason, PublishResult, RelayBroadcaster, RelayFailure, TimeoutPolicy,
};
pub use error::{RelayError, Result};
pub use messages::{ClientMessage, Filter, RelayMessage};
pub use subscriber::{
    InboundMessage, RelaySubscriber, SubscriberConfig, SubscriptionHandle, SubscriptionStream,
};
pub use transport::memory::{MemoryConnector, MemoryRelayNetwork, RelayBehaviour};
pub use transport::{parse_endpoint, RelayConnection, RelayConnector, WebSocketConnector};
