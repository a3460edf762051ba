//! Storage traits: the abstract interfaces for event and block persistence.
//!
//! Implementations include JSON lines and SQLite (primary) and in-memory
//! (for tests).

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use provenance_core::{BlockHeader, LogEvent, MemoryBlock, Sha256Hash};

use crate::error::Result;

/// Result of inserting a sealed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Block was inserted.
    Inserted,
    /// The identical block already exists (idempotent, not an error).
    AlreadyExists,
    /// A different block exists at the same `(owner_id, block_number)`.
    Conflict {
        /// Hash of the block already stored there.
        existing: Sha256Hash,
    },
}

/// Durable, append-only storage for log events.
///
/// The store does not check chain links; that is the log's job. It only
/// guarantees that an event is either fully written or not at all.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event at the end of the store.
    async fn append(&self, event: &LogEvent) -> Result<()>;

    /// Stream every stored event from the beginning, in append order.
    ///
    /// Each call starts a fresh scan. Unparseable entries are yielded as
    /// errors in place so callers can decide whether to stop.
    fn scan(&self) -> BoxStream<'_, Result<LogEvent>>;

    /// The last stored event, if any.
    ///
    /// Fails if any entry cannot be read.
    async fn last(&self) -> Result<Option<LogEvent>> {
        let mut scan = self.scan();
        let mut last = None;
        while let Some(event) = scan.next().await {
            last = Some(event?);
        }
        Ok(last)
    }

    /// Number of readable events.
    async fn count(&self) -> Result<u64> {
        let mut scan = self.scan();
        let mut count = 0;
        while let Some(event) = scan.next().await {
            event?;
            count += 1;
        }
        Ok(count)
    }
}

/// Storage for sealed memory blocks, keyed by `(owner_id, block_number)`.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Insert a sealed block. Open blocks are rejected with `InvalidData`.
    async fn insert_block(&self, block: &MemoryBlock) -> Result<InsertResult>;

    /// Get one block with its records.
    async fn get_block(&self, owner_id: &str, block_number: u64) -> Result<Option<MemoryBlock>>;

    /// Header of the owner's highest-numbered block.
    async fn latest_header(&self, owner_id: &str) -> Result<Option<BlockHeader>>;

    /// All of an owner's blocks, ordered by block number.
    async fn list_blocks(&self, owner_id: &str) -> Result<Vec<MemoryBlock>>;

    /// Every owner with at least one stored block, sorted.
    async fn list_owners(&self) -> Result<Vec<String>>;
}
