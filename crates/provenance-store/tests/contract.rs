//! Behaviour shared by every store implementation.

use futures::TryStreamExt;
use provenance_core::{
    audit_event_chain, verify_block_chain, BlockHeader, EventDraft, LogEvent, MemoryBlock,
    RecordRef, Sha256Hash,
};
use provenance_store::{
    BlockStore, EventStore, InsertResult, JsonlEventStore, MemoryBlockStore, MemoryEventStore,
    SqliteBlockStore,
};
use serde_json::json;
use tempfile::TempDir;

fn chain(n: u64) -> Vec<LogEvent> {
    let mut previous = Sha256Hash::ZERO;
    (1..=n)
        .map(|sequence| {
            let draft = EventDraft::new(format!("subject-{}", sequence % 2), "write", "alice")
                .payload(json!({ "n": sequence }));
            let event = LogEvent::from_draft(draft, sequence, previous, 1_000 * sequence as i64)
                .unwrap();
            previous = event.resource_hash;
            event
        })
        .collect()
}

async fn exercise_event_store(store: &dyn EventStore) {
    let events = chain(5);
    for event in &events {
        store.append(event).await.unwrap();
    }
    let scanned: Vec<LogEvent> = store.scan().try_collect().await.unwrap();
    assert_eq!(scanned, events);
    assert!(audit_event_chain(&scanned).is_intact());
    assert_eq!(store.count().await.unwrap(), 5);
    assert_eq!(store.last().await.unwrap().map(|e| e.sequence), Some(5));
}

fn owner_chain(owner: &str, blocks: usize) -> Vec<MemoryBlock> {
    let mut out: Vec<MemoryBlock> = Vec::new();
    for n in 0..blocks {
        let previous: Option<&BlockHeader> = out.last().map(|b| b.header());
        let mut block = MemoryBlock::open(owner, previous, n as i64 * 10);
        for r in 0..=n {
            let id = format!("{owner}-{n}-{r}");
            assert!(block.add_record(RecordRef::new(id.clone(), Sha256Hash::hash(id.as_bytes()), 2)));
        }
        block.seal(n as i64 * 10 + 5).unwrap();
        out.push(block);
    }
    out
}

async fn exercise_block_store(store: &dyn BlockStore) {
    let alice = owner_chain("alice", 3);
    let bob = owner_chain("bob", 1);
    for block in alice.iter().chain(bob.iter()) {
        assert_eq!(store.insert_block(block).await.unwrap(), InsertResult::Inserted);
    }

    let loaded = store.list_blocks("alice").await.unwrap();
    assert_eq!(loaded, alice);
    assert!(verify_block_chain("alice", &loaded).is_ok());
    assert_eq!(
        store.latest_header("alice").await.unwrap().map(|h| h.block_number),
        Some(2)
    );
    assert_eq!(store.list_owners().await.unwrap(), vec!["alice", "bob"]);

    let rebuilt = owner_chain("alice", 2).pop().unwrap();
    let mut tampered = MemoryBlock::open("alice", Some(alice[0].header()), 99);
    assert!(tampered.add_record(RecordRef::new("x", Sha256Hash::hash(b"x"), 1)));
    tampered.seal(100).unwrap();
    assert_eq!(store.insert_block(&rebuilt).await.unwrap(), InsertResult::AlreadyExists);
    assert!(matches!(
        store.insert_block(&tampered).await.unwrap(),
        InsertResult::Conflict { .. }
    ));
}

#[tokio::test]
async fn test_jsonl_event_store_contract() {
    let dir = TempDir::new().unwrap();
    let store = JsonlEventStore::open(dir.path().join("log.jsonl")).unwrap();
    exercise_event_store(&store).await;
}

#[tokio::test]
async fn test_memory_event_store_contract() {
    exercise_event_store(&MemoryEventStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_block_store_contract() {
    exercise_block_store(&SqliteBlockStore::open_memory().unwrap()).await;
}

#[tokio::test]
async fn test_memory_block_store_contract() {
    exercise_block_store(&MemoryBlockStore::new()).await;
}

#[tokio::test]
async fn test_jsonl_replay_matches_after_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.jsonl");
    let events = chain(3);
    {
        let store = JsonlEventStore::open(&path).unwrap();
        for event in &events {
            store.append(event).await.unwrap();
        }
    }
    let reopened = JsonlEventStore::open(&path).unwrap();
    let scanned: Vec<LogEvent> = reopened.scan().try_collect().await.unwrap();
    assert_eq!(scanned, events);
}
