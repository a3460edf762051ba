//! In-memory implementations of the storage traits.
//!
//! These are primarily for testing. They have the same semantics as the
//! file and SQLite stores but keep everything in memory.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use provenance_core::{BlockHeader, LogEvent, MemoryBlock};

use crate::error::{Result, StoreError};
use crate::traits::{BlockStore, EventStore, InsertResult};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory event store. All data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<LogEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing list of events, taken as-is.
    pub fn with_events(events: Vec<LogEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    /// Snapshot of all stored events.
    pub fn events(&self) -> Vec<LogEvent> {
        read(&self.events).clone()
    }

    /// Replace the event at `index`. Test hook for tamper scenarios.
    pub fn replace(&self, index: usize, event: LogEvent) -> bool {
        match write(&self.events).get_mut(index) {
            Some(slot) => {
                *slot = event;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: &LogEvent) -> Result<()> {
        write(&self.events).push(event.clone());
        Ok(())
    }

    fn scan(&self) -> BoxStream<'_, Result<LogEvent>> {
        stream::iter(self.events().into_iter().map(Ok)).boxed()
    }

    async fn last(&self) -> Result<Option<LogEvent>> {
        Ok(read(&self.events).last().cloned())
    }

    async fn count(&self) -> Result<u64> {
        Ok(read(&self.events).len() as u64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Blocks
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory sealed-block store.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<BTreeMap<(String, u64), MemoryBlock>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn insert_block(&self, block: &MemoryBlock) -> Result<InsertResult> {
        if !block.is_sealed() {
            return Err(StoreError::InvalidData(format!(
                "block {} of {} is not sealed",
                block.block_number(),
                block.owner_id()
            )));
        }
        let key = (block.owner_id().to_string(), block.block_number());
        let mut blocks = write(&self.blocks);
        if let Some(existing) = blocks.get(&key) {
            let existing_hash = existing.header().block_hash;
            if existing_hash == block.header().block_hash {
                return Ok(InsertResult::AlreadyExists);
            }
            return Ok(InsertResult::Conflict {
                existing: existing_hash,
            });
        }
        blocks.insert(key, block.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_block(&self, owner_id: &str, block_number: u64) -> Result<Option<MemoryBlock>> {
        Ok(read(&self.blocks)
            .get(&(owner_id.to_string(), block_number))
            .cloned())
    }

    async fn latest_header(&self, owner_id: &str) -> Result<Option<BlockHeader>> {
        let blocks = read(&self.blocks);
        Ok(blocks
            .range((owner_id.to_string(), 0)..=(owner_id.to_string(), u64::MAX))
            .next_back()
            .map(|(_, block)| block.header().clone()))
    }

    async fn list_blocks(&self, owner_id: &str) -> Result<Vec<MemoryBlock>> {
        let blocks = read(&self.blocks);
        Ok(blocks
            .range((owner_id.to_string(), 0)..=(owner_id.to_string(), u64::MAX))
            .map(|(_, block)| block.clone())
            .collect())
    }

    async fn list_owners(&self) -> Result<Vec<String>> {
        let blocks = read(&self.blocks);
        let mut owners: Vec<String> = blocks.keys().map(|(owner, _)| owner.clone()).collect();
        owners.dedup();
        Ok(owners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use provenance_core::{EventDraft, RecordRef, Sha256Hash};

    fn sealed(owner: &str, previous: Option<&BlockHeader>, tag: &str) -> MemoryBlock {
        let mut block = MemoryBlock::open(owner, previous, 1_000);
        assert!(block.add_record(RecordRef::new(tag, Sha256Hash::hash(tag.as_bytes()), 1)));
        block.seal(2_000).unwrap();
        block
    }

    #[tokio::test]
    async fn test_memory_event_store_order() {
        let store = MemoryEventStore::new();
        let first = LogEvent::from_draft(EventDraft::new("s", "a", "u"), 1, Sha256Hash::ZERO, 1).unwrap();
        let second =
            LogEvent::from_draft(EventDraft::new("s", "b", "u"), 2, first.resource_hash, 2).unwrap();
        store.append(&first).await.unwrap();
        store.append(&second).await.unwrap();

        let events: Vec<LogEvent> = store.scan().try_collect().await.unwrap();
        assert_eq!(events, vec![first, second.clone()]);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.last().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_insert_block_idempotent() {
        let store = MemoryBlockStore::new();
        let block = sealed("alice", None, "r1");
        assert_eq!(store.insert_block(&block).await.unwrap(), InsertResult::Inserted);
        assert_eq!(store.insert_block(&block).await.unwrap(), InsertResult::AlreadyExists);
    }

    #[tokio::test]
    async fn test_insert_block_conflict() {
        let store = MemoryBlockStore::new();
        let a = sealed("alice", None, "r1");
        let b = sealed("alice", None, "r2");
        store.insert_block(&a).await.unwrap();
        assert_eq!(
            store.insert_block(&b).await.unwrap(),
            InsertResult::Conflict {
                existing: a.header().block_hash
            }
        );
    }

    #[tokio::test]
    async fn test_open_block_rejected() {
        let store = MemoryBlockStore::new();
        let block = MemoryBlock::open("alice", None, 0);
        assert!(matches!(
            store.insert_block(&block).await,
            Err(StoreError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_owners_are_independent() {
        let store = MemoryBlockStore::new();
        let a0 = sealed("alice", None, "a0");
        let a1 = sealed("alice", Some(a0.header()), "a1");
        let b0 = sealed("bob", None, "b0");
        for block in [&a0, &a1, &b0] {
            store.insert_block(block).await.unwrap();
        }

        assert_eq!(store.list_owners().await.unwrap(), vec!["alice", "bob"]);
        assert_eq!(store.list_blocks("alice").await.unwrap(), vec![a0, a1.clone()]);
        assert_eq!(
            store.latest_header("alice").await.unwrap(),
            Some(a1.header().clone())
        );
        assert_eq!(store.latest_header("carol").await.unwrap(), None);
        assert_eq!(store.get_block("bob", 0).await.unwrap(), Some(b0));
        assert_eq!(store.get_block("bob", 1).await.unwrap(), None);
    }
}
