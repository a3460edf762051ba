//! # Provenance
//!
//! Verifiable authorship and history for a single sovereign identity:
//! signed content, a hash-chained event log, Merkle-sealed memory blocks,
//! and NIP-01 relay broadcast.
//!
//! ## Overview
//!
//! - **Identity**: a secp256k1 key created once and kept on disk
//! - **Signatures**: content and records signed with the active strategy
//! - **Event log**: every state mutation appended, sequenced and hash-linked
//! - **Memory chain**: records batched per owner behind a Merkle root
//! - **Relays**: signed wire events fanned out to many relays at once
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provenance::{Provenance, ProvenanceConfig};
//! use serde_json::json;
//!
//! async fn example() {
//!     provenance::logging::init();
//!
//!     let config = ProvenanceConfig::in_dir("provenance-data");
//!     let service = Provenance::init(config).await.unwrap();
//!
//!     // Sign and check content
//!     let signature = service.sign(b"hello").unwrap();
//!     assert!(service.verify(b"hello", &signature));
//!
//!     // Record a mutation before performing it
//!     service
//!         .record("user-42", "profile.update", json!({"name": "Ada"}), json!({}))
//!         .await
//!         .unwrap();
//!
//!     // Batch a memory into the owner's chain
//!     let (_, receipt) = service.remember("user-42", "mem-1", b"met Ada", 3).await.unwrap();
//!     if let Some(header) = receipt.sealed {
//!         let result = service.announce_block(&header).await.unwrap();
//!         println!("published: {}", result.published);
//!     }
//!
//!     let sweep = service.shutdown().await;
//!     assert!(sweep.is_complete());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `provenance::core` - Hashes, keys, events, blocks, wire events
//! - `provenance::identity` - KeyStore and ContentSigner
//! - `provenance::store` - Event and block stores
//! - `provenance::relay` - Broadcaster and subscriber

pub mod config;
pub mod error;
pub mod event_log;
pub mod logging;
pub mod memory_chain;
pub mod service;
pub mod wire_builder;

pub use provenance_core as core;
pub use provenance_identity as identity;
pub use provenance_relay as relay;
pub use provenance_store as store;

pub use config::{ProvenanceConfig, RelaySettings};
pub use error::{ProvenanceError, Result};
pub use event_log::{audit_event_store, EventLog};
pub use memory_chain::{BlockAudit, MemoryChain, RecordProof, RecordReceipt, SealSweep};
pub use service::Provenance;
pub use wire_builder::WireEventBuilder;

pub use provenance_core::{
    BlockHeader, ChainAudit, EventQuery, IntegrityViolation, LogEvent, MemoryBlock, RecordRef,
    SealPolicy, Sha256Hash, WireEvent,
};
pub use provenance_identity::{ContentSignature, ContentSigner, KeyStore, SignatureAlgorithm};
pub use provenance_relay::{PublishResult, TimeoutPolicy};
