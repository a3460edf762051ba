//! # Provenance Core
//!
//! Pure primitives for the provenance subsystem: hashes, Schnorr keys,
//! hash-chained log events, Merkle-sealed memory blocks and NIP-01 wire events.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! synchronous, CPU-bound computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Sha256Hash`] - 32-byte digest used for every hash link and content hash
//! - [`Keypair`] - BIP-340 Schnorr signing key over secp256k1
//! - [`LogEvent`] - An entry of the append-only, hash-chained event log
//! - [`ContentSignature`] - A detached signature, carried by authored log events
//! - [`MemoryBlock`] - A per-owner batch of record references sealed behind a Merkle root
//! - [`WireEvent`] - A NIP-01 event with canonical id and Schnorr signature
//!
//! ## Canonicalization
//!
//! Block headers are hashed over deterministic CBOR, log events over sorted-key
//! compact JSON and wire events over the NIP-01 id preimage. See [`canonical`].

pub mod block;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod event;
pub mod merkle;
pub mod signature;
pub mod types;
pub mod validation;
pub mod wire;

pub use block::{BlockHeader, BlockStatus, MemoryBlock, RecordRef, SealPolicy};
pub use canonical::{canonical_header_bytes, canonical_json, nip01_preimage};
pub use crypto::{Keypair, SchnorrPublicKey, SchnorrSignature, Sha256Hash};
pub use error::{CoreError, IntegrityViolation};
pub use event::{EventDraft, EventQuery, LogEvent};
pub use merkle::{merkle_root, MerkleProof, MerkleTree};
pub use signature::{ContentSignature, SignatureAlgorithm};
pub use types::{now_millis, now_seconds, IdentityAddress};
pub use validation::{audit_event_chain, verify_block_chain, ChainAudit, ChainAuditor};
pub use wire::{kinds, Tag, UnsignedWireEvent, WireEvent};
