//! # Provenance Testkit
//!
//! Testing utilities for the provenance crates.
//!
//! ## Overview
//!
//! - **Golden vectors**: NIP-01 event ids and Merkle roots with known answers
//! - **Generators**: Proptest strategies for records, drafts and wire events
//! - **Fixtures**: Deterministic identities and prebuilt chains
//!
//! ## Golden Vectors
//!
//! ```rust
//! use provenance_testkit::vectors::{verify_all_vectors, wire_vectors};
//!
//! for (name, ok, id) in verify_all_vectors() {
//!     assert!(ok, "{name} produced {id}");
//! }
//! assert!(!wire_vectors().is_empty());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use provenance_testkit::generators::record_refs;
//!
//! proptest! {
//!     #[test]
//!     fn root_is_deterministic(records in record_refs(1..32)) {
//!         // ...
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use provenance_testkit::fixtures::TestIdentity;
//!
//! let alice = TestIdentity::with_seed([7; 32]);
//! let chain = alice.event_chain(5);
//! assert_eq!(chain.len(), 5);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_party_identities, record_ref, sealed_chain, TestIdentity};
pub use generators::{event_draft, record_refs, wire_fields, WireFields};
pub use vectors::{merkle_vectors, verify_all_vectors, wire_vectors, MerkleVector, WireVector};
