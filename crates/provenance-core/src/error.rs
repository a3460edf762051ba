//! Error types for the provenance core.

use thiserror::Error;

/// Core errors that can occur while building or sealing provenance structures.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("cannot seal an empty block")]
    EmptyBlock,

    #[error("block {0} is already sealed")]
    BlockAlreadySealed(u64),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

/// Evidence that a hash chain or a sealed block does not verify.
///
/// Only explicit audits produce these; append and seal never check them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    #[error("event {sequence}: stored resource hash does not match its fields")]
    ResourceHashMismatch { sequence: u64 },

    #[error("event {sequence}: previous hash does not match its predecessor")]
    BrokenLink { sequence: u64 },

    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("event {sequence}: no author signature")]
    MissingAuthorSignature { sequence: u64 },

    #[error("event {sequence}: author signature does not match the event or its author")]
    AuthorSignatureInvalid { sequence: u64 },

    #[error("entry {position} is unreadable: {reason}")]
    Unreadable { position: u64, reason: String },

    #[error("block {block_number}: merkle root does not match its records")]
    MerkleRootMismatch { block_number: u64 },

    #[error("block {block_number}: block hash does not match its header")]
    BlockHashMismatch { block_number: u64 },

    #[error("block {block_number}: header totals do not match its records")]
    HeaderTotalsMismatch { block_number: u64 },

    #[error("block {block_number}: previous hash does not match the preceding block")]
    BlockLinkMismatch { block_number: u64 },

    #[error("block numbering gap: expected {expected}, found {found}")]
    BlockNumberGap { expected: u64, found: u64 },

    #[error("block {block_number} belongs to owner {found}, expected {expected}")]
    OwnerMismatch {
        block_number: u64,
        expected: String,
        found: String,
    },

    #[error("block {block_number} is not sealed")]
    NotSealed { block_number: u64 },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
