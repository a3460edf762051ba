//! # Provenance Identity
//!
//! Sovereign identity for the provenance subsystem: a secp256k1 key persisted
//! on disk, two interchangeable signing strategies, and content signing.
//!
//! ## Key Types
//!
//! - [`KeyStore`] - Owns the private key. Generates it once, loads it thereafter.
//! - [`SignatureAlgorithm`] - Which strategy produced a signature
//! - [`SigningBackend`] - The strategy interface (Schnorr or insecure HMAC)
//! - [`ContentSigner`] - Signs and verifies bytes and structured records
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use provenance_identity::{ContentSigner, KeyStore, SignatureAlgorithm};
//!
//! let keys = KeyStore::generate_or_load("./keys", "alice", SignatureAlgorithm::SchnorrSecp256k1)
//!     .unwrap();
//! let signer = ContentSigner::new(Arc::new(keys));
//!
//! let sig = signer.sign(b"hello").unwrap();
//! assert!(signer.verify(b"hello", &sig));
//! ```
//!
//! ## Design Notes
//!
//! - **Explicit strategy**: the algorithm is chosen when the KeyStore is built,
//!   never auto-detected. The insecure fallback logs a warning and is named in
//!   every signature it produces.
//! - **Boolean verification**: a bad signature is a `false`, not an error.

pub mod backend;
pub mod error;
pub mod keystore;
pub mod signer;

pub use backend::{backend_for, InsecureHmacBackend, SchnorrBackend, SignatureAlgorithm, SigningBackend};
pub use error::{IdentityError, Result};
pub use keystore::{IdentityDescriptor, KeyStore};
pub use signer::{ContentSignature, ContentSigner, SignedRecord};
