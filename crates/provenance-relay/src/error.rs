//! Error types for the relay module.

use thiserror::Error;

/// Errors that can occur while talking to relays.
///
/// `publish` never returns these; per-endpoint failures are folded into
/// its result. They surface from subscriptions and from the codec.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Endpoint is not a `ws://` or `wss://` URL.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Could not establish a connection.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// WebSocket transport error after connecting.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Message does not follow the NIP-01 framing.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timed out waiting for the relay.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
