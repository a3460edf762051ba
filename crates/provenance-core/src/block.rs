//! MemoryBlock: a per-owner batch of record references sealed behind a Merkle root.
//!
//! A block is OPEN while it accepts records and SEALED once its Merkle root
//! is fixed. The transition is one-way. Blocks of one owner form a chain:
//! block k links to the hash of block k-1, and block 0 links to a genesis
//! hash derived from the owner id.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_header_bytes, BLOCK_DOMAIN, GENESIS_DOMAIN};
use crate::crypto::Sha256Hash;
use crate::error::{CoreError, IntegrityViolation, Result};
use crate::merkle::{merkle_root, MerkleProof, MerkleTree};

/// A reference to a signed record batched into a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    /// Caller-assigned record identifier.
    pub id: String,
    /// SHA-256 of the record content. This is the Merkle leaf.
    pub content_hash: Sha256Hash,
    /// Contribution towards the weight seal threshold.
    pub weight: u64,
}

impl RecordRef {
    pub fn new(id: impl Into<String>, content_hash: Sha256Hash, weight: u64) -> Self {
        Self {
            id: id.into(),
            content_hash,
            weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockStatus {
    Open,
    Sealed,
}

impl BlockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockStatus::Open => "OPEN",
            BlockStatus::Sealed => "SEALED",
        }
    }
}

/// The header of a memory block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Position in the owner's chain (0-indexed).
    pub block_number: u64,

    /// SHA-256 over the canonical header. Provisional while the block is open.
    pub block_hash: Sha256Hash,

    /// Hash of the preceding block, or the owner genesis link for block 0.
    pub previous_hash: Sha256Hash,

    /// Merkle root over record content hashes. Only set once sealed.
    pub merkle_root: Option<Sha256Hash>,

    pub record_count: u64,

    pub aggregate_weight: u64,

    /// Unix milliseconds.
    pub opened_at: i64,

    /// Unix milliseconds. Only set once sealed.
    pub sealed_at: Option<i64>,

    pub owner_id: String,
}

impl BlockHeader {
    /// Hash of the canonical header, excluding `block_hash` itself.
    pub fn compute_hash(&self) -> Sha256Hash {
        Sha256Hash::hash_with_domain(BLOCK_DOMAIN, &canonical_header_bytes(self))
    }
}

/// Thresholds deciding when an open block should be sealed.
///
/// Any one trigger suffices. An empty block is never ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SealPolicy {
    /// Seal once this many records have been added.
    pub max_records: u64,
    /// Seal once the summed record weight reaches this value.
    pub max_weight: u64,
    /// Seal once the block has been open this long (milliseconds).
    pub max_open_ms: u64,
}

impl Default for SealPolicy {
    fn default() -> Self {
        Self {
            max_records: 64,
            max_weight: 1000,
            max_open_ms: 60 * 60 * 1000,
        }
    }
}

/// A memory block: header, ordered record references and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    header: BlockHeader,
    records: Vec<RecordRef>,
    status: BlockStatus,
}

impl MemoryBlock {
    /// The deterministic predecessor link of an owner's first block.
    ///
    /// Distinct owners get distinct links even with no predecessor.
    pub fn genesis_link(owner_id: &str) -> Sha256Hash {
        Sha256Hash::hash_with_domain(GENESIS_DOMAIN, owner_id.as_bytes())
    }

    /// Open a new block linked to `previous`, or to the owner genesis link.
    pub fn open(owner_id: &str, previous: Option<&BlockHeader>, opened_at: i64) -> Self {
        let (block_number, previous_hash) = match previous {
            Some(prev) => (prev.block_number + 1, prev.block_hash),
            None => (0, Self::genesis_link(owner_id)),
        };

        let mut header = BlockHeader {
            block_number,
            block_hash: Sha256Hash::ZERO,
            previous_hash,
            merkle_root: None,
            record_count: 0,
            aggregate_weight: 0,
            opened_at,
            sealed_at: None,
            owner_id: owner_id.to_string(),
        };
        header.block_hash = header.compute_hash();

        Self {
            header,
            records: Vec::new(),
            status: BlockStatus::Open,
        }
    }

    /// Rebuild a block from persisted parts. Nothing is checked; use [`verify`](Self::verify).
    pub fn from_parts(header: BlockHeader, records: Vec<RecordRef>, status: BlockStatus) -> Self {
        Self {
            header,
            records,
            status,
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn records(&self) -> &[RecordRef] {
        &self.records
    }

    pub fn status(&self) -> BlockStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == BlockStatus::Open
    }

    pub fn is_sealed(&self) -> bool {
        self.status == BlockStatus::Sealed
    }

    pub fn owner_id(&self) -> &str {
        &self.header.owner_id
    }

    pub fn block_number(&self) -> u64 {
        self.header.block_number
    }

    /// Record content hashes in insertion order.
    pub fn record_hashes(&self) -> Vec<Sha256Hash> {
        self.records.iter().map(|r| r.content_hash).collect()
    }

    /// Append a record if the block is open.
    ///
    /// Returns `false` and leaves the block untouched if it is sealed.
    #[must_use = "a sealed block rejects records"]
    pub fn add_record(&mut self, record: RecordRef) -> bool {
        if !self.is_open() {
            return false;
        }
        self.header.record_count += 1;
        self.header.aggregate_weight = self.header.aggregate_weight.saturating_add(record.weight);
        self.records.push(record);
        true
    }

    /// Whether any seal trigger of `policy` has fired at time `now` (Unix ms).
    pub fn is_ready_to_seal(&self, policy: &SealPolicy, now: i64) -> bool {
        if !self.is_open() || self.records.is_empty() {
            return false;
        }
        let open_for = now.saturating_sub(self.header.opened_at).max(0) as u64;
        self.header.record_count >= policy.max_records
            || self.header.aggregate_weight >= policy.max_weight
            || open_for >= policy.max_open_ms
    }

    /// Seal the block: fix the Merkle root over the current record order,
    /// stamp `sealed_at`, recompute `block_hash` and flip to SEALED.
    ///
    /// Fails on an empty block and on a block that is already sealed.
    pub fn seal(&mut self, sealed_at: i64) -> Result<BlockHeader> {
        if self.is_sealed() {
            return Err(CoreError::BlockAlreadySealed(self.header.block_number));
        }
        let root = merkle_root(&self.record_hashes()).ok_or(CoreError::EmptyBlock)?;

        self.header.merkle_root = Some(root);
        self.header.sealed_at = Some(sealed_at);
        self.header.block_hash = self.header.compute_hash();
        self.status = BlockStatus::Sealed;
        Ok(self.header.clone())
    }

    /// Inclusion proof for the record at `index` against the sealed root.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if !self.is_sealed() {
            return None;
        }
        MerkleTree::build(&self.record_hashes())?.proof(index)
    }

    /// Check a sealed block against its own records.
    pub fn verify(&self) -> std::result::Result<(), IntegrityViolation> {
        let block_number = self.header.block_number;
        if !self.is_sealed() {
            return Err(IntegrityViolation::NotSealed { block_number });
        }

        let weight = self
            .records
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.weight));
        if self.header.record_count != self.records.len() as u64
            || self.header.aggregate_weight != weight
        {
            return Err(IntegrityViolation::HeaderTotalsMismatch { block_number });
        }

        if self.header.merkle_root.is_none()
            || self.header.merkle_root != merkle_root(&self.record_hashes())
        {
            return Err(IntegrityViolation::MerkleRootMismatch { block_number });
        }

        if self.header.block_hash != self.header.compute_hash() {
            return Err(IntegrityViolation::BlockHashMismatch { block_number });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, weight: u64) -> RecordRef {
        RecordRef::new(id, Sha256Hash::hash(id.as_bytes()), weight)
    }

    fn block_with(ids: &[&str]) -> MemoryBlock {
        let mut block = MemoryBlock::open("owner-1", None, 1_000);
        for id in ids {
            assert!(block.add_record(rec(id, 10)));
        }
        block
    }

    #[test]
    fn test_open_genesis_block() {
        let block = MemoryBlock::open("owner-1", None, 1_000);
        assert_eq!(block.block_number(), 0);
        assert_eq!(block.header().previous_hash, MemoryBlock::genesis_link("owner-1"));
        assert!(block.is_open());
        assert!(block.header().merkle_root.is_none());
    }

    #[test]
    fn test_genesis_links_differ_per_owner() {
        assert_ne!(MemoryBlock::genesis_link("alice"), MemoryBlock::genesis_link("bob"));
    }

    #[test]
    fn test_next_block_links_to_previous_hash() {
        let mut first = block_with(&["a"]);
        let header = first.seal(2_000).unwrap();
        let second = MemoryBlock::open("owner-1", Some(&header), 3_000);
        assert_eq!(second.block_number(), 1);
        assert_eq!(second.header().previous_hash, header.block_hash);
    }

    #[test]
    fn test_seal_empty_fails() {
        let mut block = MemoryBlock::open("owner-1", None, 1_000);
        assert!(matches!(block.seal(2_000), Err(CoreError::EmptyBlock)));
        assert!(block.is_open());
    }

    #[test]
    fn test_seal_twice_fails() {
        let mut block = block_with(&["a", "b"]);
        block.seal(2_000).unwrap();
        assert!(matches!(block.seal(3_000), Err(CoreError::BlockAlreadySealed(0))));
    }

    #[test]
    fn test_add_to_sealed_returns_false() {
        let mut block = block_with(&["a"]);
        block.seal(2_000).unwrap();
        let before = block.header().record_count;
        assert!(!block.add_record(rec("b", 1)));
        assert_eq!(block.header().record_count, before);
        assert_eq!(block.records().len(), 1);
    }

    #[test]
    fn test_seal_recomputes_block_hash() {
        let mut block = block_with(&["a", "b", "c"]);
        let provisional = block.header().block_hash;
        let header = block.seal(2_000).unwrap();
        assert_ne!(header.block_hash, provisional);
        assert_eq!(header.block_hash, header.compute_hash());
        assert_eq!(
            header.merkle_root.unwrap().to_hex(),
            "d31a37ef6ac14a2db1470c4316beb5592e6afd4465022339adafda76a18ffabe"
        );
        block.verify().unwrap();
    }

    #[test]
    fn test_merkle_root_order_sensitive() {
        let mut ab = block_with(&["a", "b"]);
        let mut ba = block_with(&["b", "a"]);
        let r1 = ab.seal(2_000).unwrap().merkle_root;
        let r2 = ba.seal(2_000).unwrap().merkle_root;
        assert_ne!(r1, r2);
    }

    #[test]
    fn test_equal_blocks_seal_to_equal_roots() {
        let mut b1 = block_with(&["a", "b", "c"]);
        let mut b2 = block_with(&["a", "b", "c"]);
        assert_eq!(b1.seal(5).unwrap(), b2.seal(5).unwrap());
    }

    #[test]
    fn test_seal_triggers() {
        let policy = SealPolicy {
            max_records: 3,
            max_weight: 100,
            max_open_ms: 10_000,
        };

        let empty = MemoryBlock::open("o", None, 0);
        assert!(!empty.is_ready_to_seal(&policy, 1_000_000));

        let mut by_count = MemoryBlock::open("o", None, 0);
        for id in ["a", "b"] {
            assert!(by_count.add_record(rec(id, 1)));
        }
        assert!(!by_count.is_ready_to_seal(&policy, 1));
        assert!(by_count.add_record(rec("c", 1)));
        assert!(by_count.is_ready_to_seal(&policy, 1));

        let mut by_weight = MemoryBlock::open("o", None, 0);
        assert!(by_weight.add_record(rec("heavy", 100)));
        assert!(by_weight.is_ready_to_seal(&policy, 1));

        let mut by_age = MemoryBlock::open("o", None, 0);
        assert!(by_age.add_record(rec("a", 1)));
        assert!(!by_age.is_ready_to_seal(&policy, 9_999));
        assert!(by_age.is_ready_to_seal(&policy, 10_000));
    }

    #[test]
    fn test_verify_detects_tampered_record() {
        let mut block = block_with(&["a", "b"]);
        block.seal(2_000).unwrap();
        let mut records = block.records().to_vec();
        records[1].content_hash = Sha256Hash::hash(b"evil");
        let tampered = MemoryBlock::from_parts(block.header().clone(), records, BlockStatus::Sealed);
        assert_eq!(
            tampered.verify(),
            Err(IntegrityViolation::MerkleRootMismatch { block_number: 0 })
        );
    }

    #[test]
    fn test_proof_for_sealed_record() {
        let mut block = block_with(&["a", "b", "c"]);
        assert!(block.proof(0).is_none());
        let header = block.seal(2_000).unwrap();
        let proof = block.proof(2).unwrap();
        assert!(proof.verify(&Sha256Hash::hash(b"c"), &header.merkle_root.unwrap()));
    }
}
