//! # Provenance Store
//!
//! Persistence for the provenance subsystem. Two traits keep the service
//! layer storage-agnostic: [`EventStore`] for the append-only event log and
//! [`BlockStore`] for sealed memory blocks.
//!
//! ## Key Types
//!
//! - [`EventStore`] - Async append/scan interface for log events
//! - [`JsonlEventStore`] - One JSON object per line, append-only file
//! - [`MemoryEventStore`] - In-memory event store for tests
//! - [`BlockStore`] - Async interface for sealed blocks
//! - [`SqliteBlockStore`] - SQLite-based block storage
//! - [`MemoryBlockStore`] - In-memory block storage for tests
//! - [`InsertResult`] - Result of inserting a block
//!
//! ## Usage
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use provenance_store::{EventStore, JsonlEventStore, SqliteBlockStore};
//!
//! async fn example() {
//!     let events = JsonlEventStore::open("data/events.jsonl").unwrap();
//!     let mut scan = events.scan();
//!     while let Some(event) = scan.next().await {
//!         let event = event.unwrap();
//!         println!("{} {}", event.sequence, event.action_type);
//!     }
//!
//!     let blocks = SqliteBlockStore::open("data/blocks.db").unwrap();
//!     let _ = blocks;
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Append only**: event stores have no update or delete path
//! - **No torn records**: a failed JSONL append truncates back to the previous length
//! - **Idempotent inserts**: inserting the same sealed block twice returns `AlreadyExists`
//! - **Conflict detection**: a different block at the same position returns `Conflict`
//! - **Scans are restartable**: every call to `scan` reads the store from the start

pub mod error;
pub mod jsonl;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use jsonl::JsonlEventStore;
pub use memory::{MemoryBlockStore, MemoryEventStore};
pub use sqlite::SqliteBlockStore;
pub use traits::{BlockStore, EventStore, InsertResult};
