//! Error types for the provenance service.

use provenance_core::{CoreError, IntegrityViolation};
use provenance_identity::{IdentityError, SignatureAlgorithm};
use provenance_relay::RelayError;
use provenance_store::StoreError;
use thiserror::Error;

/// Errors that can occur during provenance operations.
///
/// Verification outcomes are never errors; they are booleans or audit
/// reports. These variants cover missing keys, storage and programming
/// errors.
#[derive(Debug, Error)]
pub enum ProvenanceError {
    /// Key material or signing failure.
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Relay error (subscriptions only; publishing folds failures into its result).
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Core error, e.g. sealing an empty block.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The active signing strategy cannot perform this operation.
    #[error("{operation} requires schnorr-secp256k1, active strategy is {algorithm}")]
    UnsupportedAlgorithm {
        algorithm: SignatureAlgorithm,
        operation: &'static str,
    },

    /// An authored log refused an event claiming another identity.
    #[error("event author {author} is not the signing identity {identity}")]
    AuthorMismatch { author: String, identity: String },

    /// Block header is not sealed.
    #[error("block {block_number} of {owner_id} is not sealed")]
    NotSealed { owner_id: String, block_number: u64 },

    /// A different block is already stored at this position.
    #[error("block {block_number} of {owner_id} conflicts with a stored block")]
    BlockConflict { owner_id: String, block_number: u64 },

    /// Returned only by explicit verification calls that ask for an error.
    #[error("chain integrity violation: {0}")]
    Integrity(#[from] IntegrityViolation),
}

impl ProvenanceError {
    /// Whether this error means no usable key material exists.
    pub fn is_key_unavailable(&self) -> bool {
        matches!(self, ProvenanceError::Identity(IdentityError::KeyUnavailable { .. }))
    }
}

/// Result type for provenance operations.
pub type Result<T> = std::result::Result<T, ProvenanceError>;
