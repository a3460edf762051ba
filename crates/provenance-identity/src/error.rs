//! Error types for the identity module.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::SignatureAlgorithm;

/// Errors that can occur during key management and signing.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Persisted key material is missing, unreadable or corrupt.
    #[error("key unavailable at {path}: {reason}")]
    KeyUnavailable { path: PathBuf, reason: String },

    /// The identity name cannot be used as a file stem.
    #[error("invalid identity name: {0:?}")]
    InvalidIdentityName(String),

    /// The active signing strategy cannot perform this operation.
    #[error("{operation} requires schnorr-secp256k1, active algorithm is {algorithm}")]
    UnsupportedAlgorithm {
        algorithm: SignatureAlgorithm,
        operation: &'static str,
    },

    /// Descriptor or record serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Signing primitive failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] provenance_core::CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;
