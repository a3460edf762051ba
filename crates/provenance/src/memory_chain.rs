//! MemoryChain: per-owner chains of Merkle-sealed memory blocks.
//!
//! Each owner has at most one OPEN block, held in memory. Records are added
//! to it until a [`SealPolicy`] trigger fires, at which point the block is
//! sealed, persisted through a [`BlockStore`], and the next record opens a
//! successor linked to it.
//!
//! Writes for one owner serialize on that owner's lock. Different owners
//! never contend beyond a short map lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use provenance_core::{
    now_millis, verify_block_chain, BlockHeader, CoreError, IntegrityViolation, MemoryBlock,
    MerkleProof, RecordRef, SealPolicy, Sha256Hash,
};
use provenance_store::{BlockStore, InsertResult};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ProvenanceError, Result};

/// Where a record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReceipt {
    pub owner_id: String,
    pub block_number: u64,
    /// Position of the record within its block.
    pub index: usize,
    /// Header of the block if this record triggered its seal.
    pub sealed: Option<BlockHeader>,
}

/// Proof that a record is part of a sealed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordProof {
    pub record: RecordRef,
    pub proof: MerkleProof,
    pub merkle_root: Sha256Hash,
    pub block_hash: Sha256Hash,
}

impl RecordProof {
    pub fn verify(&self) -> bool {
        self.proof.verify(&self.record.content_hash, &self.merkle_root)
    }
}

/// Result of replaying an owner's persisted blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAudit {
    pub owner_id: String,
    pub blocks_read: u64,
    pub violation: Option<IntegrityViolation>,
}

impl BlockAudit {
    pub fn is_intact(&self) -> bool {
        self.violation.is_none()
    }
}

/// Outcome of sealing across owners.
///
/// One owner's failure never stops the others from being sealed.
#[derive(Debug, Default)]
pub struct SealSweep {
    pub sealed: Vec<BlockHeader>,
    /// Owners whose block could not be sealed. Their blocks stay open.
    pub failed: Vec<(String, ProvenanceError)>,
}

impl SealSweep {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct OwnerChain {
    open: Option<MemoryBlock>,
    last_sealed: Option<BlockHeader>,
    loaded: bool,
}

/// The memory chain service.
pub struct MemoryChain<B: BlockStore> {
    store: Arc<B>,
    policy: SealPolicy,
    owners: StdMutex<HashMap<String, Arc<Mutex<OwnerChain>>>>,
}

impl<B: BlockStore> MemoryChain<B> {
    pub fn new(store: B, policy: SealPolicy) -> Self {
        Self::new_shared(Arc::new(store), policy)
    }

    pub fn new_shared(store: Arc<B>, policy: SealPolicy) -> Self {
        Self {
            store,
            policy,
            owners: StdMutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<B> {
        &self.store
    }

    pub fn policy(&self) -> &SealPolicy {
        &self.policy
    }

    fn owner(&self, owner_id: &str) -> Arc<Mutex<OwnerChain>> {
        let mut owners = self.owners.lock().unwrap_or_else(|e| e.into_inner());
        owners.entry(owner_id.to_string()).or_default().clone()
    }

    fn owner_snapshot(&self) -> Vec<(String, Arc<Mutex<OwnerChain>>)> {
        let owners = self.owners.lock().unwrap_or_else(|e| e.into_inner());
        owners
            .iter()
            .map(|(id, chain)| (id.clone(), chain.clone()))
            .collect()
    }

    async fn load(&self, owner_id: &str, chain: &mut OwnerChain) -> Result<()> {
        if !chain.loaded {
            chain.last_sealed = self.store.latest_header(owner_id).await?;
            chain.loaded = true;
        }
        Ok(())
    }

    async fn ensure_open<'a>(
        &self,
        owner_id: &str,
        chain: &'a mut OwnerChain,
    ) -> Result<&'a mut MemoryBlock> {
        self.load(owner_id, chain).await?;
        let previous = chain.last_sealed.as_ref();
        let block = chain.open.get_or_insert_with(|| {
            let block = MemoryBlock::open(owner_id, previous, now_millis());
            debug!(owner = owner_id, block = block.block_number(), "block opened");
            block
        });
        Ok(block)
    }

    /// The owner's OPEN block, opening one if none exists.
    ///
    /// A new block links to the owner's last persisted block, or to the
    /// owner genesis link.
    pub async fn open_block(&self, owner_id: &str) -> Result<MemoryBlock> {
        let owner = self.owner(owner_id);
        let mut chain = owner.lock().await;
        Ok(self.ensure_open(owner_id, &mut chain).await?.clone())
    }

    /// Add a record to the owner's open block, sealing it if the policy
    /// says so.
    ///
    /// A failed automatic seal leaves the block open with the record in
    /// it; the next `add_record` or [`seal_expired`](Self::seal_expired)
    /// retries.
    pub async fn add_record(&self, owner_id: &str, record: RecordRef) -> Result<RecordReceipt> {
        let owner = self.owner(owner_id);
        let mut chain = owner.lock().await;

        let block = self.ensure_open(owner_id, &mut chain).await?;
        let block_number = block.block_number();
        if !block.add_record(record) {
            return Err(CoreError::BlockAlreadySealed(block_number).into());
        }
        let index = block.records().len() - 1;
        let ready = block.is_ready_to_seal(&self.policy, now_millis());

        let sealed = if ready {
            match self.seal_locked(owner_id, &mut chain, now_millis()).await {
                Ok(header) => Some(header),
                Err(e) => {
                    warn!(owner = owner_id, block = block_number, error = %e, "automatic seal failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(RecordReceipt {
            owner_id: owner_id.to_string(),
            block_number,
            index,
            sealed,
        })
    }

    /// Seal the owner's open block now, whatever the policy says.
    ///
    /// Fails with [`CoreError::EmptyBlock`] if there is nothing to seal.
    pub async fn seal_now(&self, owner_id: &str) -> Result<BlockHeader> {
        let owner = self.owner(owner_id);
        let mut chain = owner.lock().await;
        self.seal_locked(owner_id, &mut chain, now_millis()).await
    }

    /// Seal every open block whose policy trigger has fired.
    pub async fn seal_expired(&self) -> SealSweep {
        self.seal_expired_at(now_millis()).await
    }

    /// [`seal_expired`](Self::seal_expired) with an explicit clock.
    pub async fn seal_expired_at(&self, now: i64) -> SealSweep {
        self.sweep(now, |block| block.is_ready_to_seal(&self.policy, now))
            .await
    }

    /// Seal every non-empty open block. Used at shutdown.
    pub async fn seal_all_open(&self) -> SealSweep {
        self.sweep(now_millis(), |block| !block.records().is_empty())
            .await
    }

    async fn sweep(&self, sealed_at: i64, select: impl Fn(&MemoryBlock) -> bool) -> SealSweep {
        let mut sweep = SealSweep::default();
        for (owner_id, owner) in self.owner_snapshot() {
            let mut chain = owner.lock().await;
            if !chain.open.as_ref().is_some_and(&select) {
                continue;
            }
            match self.seal_locked(&owner_id, &mut chain, sealed_at).await {
                Ok(header) => sweep.sealed.push(header),
                Err(e) => {
                    warn!(owner = %owner_id, error = %e, "seal failed during sweep");
                    sweep.failed.push((owner_id, e));
                }
            }
        }
        sweep
    }

    // The open block is sealed on a copy; it is only replaced once the
    // store has accepted the sealed version.
    async fn seal_locked(
        &self,
        owner_id: &str,
        chain: &mut OwnerChain,
        sealed_at: i64,
    ) -> Result<BlockHeader> {
        let mut block = chain.open.clone().ok_or(CoreError::EmptyBlock)?;
        let header = block.seal(sealed_at)?;

        match self.store.insert_block(&block).await? {
            InsertResult::Inserted | InsertResult::AlreadyExists => {}
            InsertResult::Conflict { existing } => {
                warn!(
                    owner = owner_id,
                    block = header.block_number,
                    existing = %existing,
                    "sealed block conflicts with stored block"
                );
                return Err(ProvenanceError::BlockConflict {
                    owner_id: owner_id.to_string(),
                    block_number: header.block_number,
                });
            }
        }

        chain.open = None;
        chain.last_sealed = Some(header.clone());
        info!(
            owner = owner_id,
            block = header.block_number,
            records = header.record_count,
            weight = header.aggregate_weight,
            "block sealed"
        );
        Ok(header)
    }

    /// Snapshot of the owner's open block, if any.
    pub async fn current_block(&self, owner_id: &str) -> Option<MemoryBlock> {
        let owner = self.owner(owner_id);
        let chain = owner.lock().await;
        chain.open.clone()
    }

    /// Header of the owner's most recent sealed block.
    pub async fn latest_header(&self, owner_id: &str) -> Result<Option<BlockHeader>> {
        let owner = self.owner(owner_id);
        let mut chain = owner.lock().await;
        self.load(owner_id, &mut chain).await?;
        Ok(chain.last_sealed.clone())
    }

    pub async fn sealed_blocks(&self, owner_id: &str) -> Result<Vec<MemoryBlock>> {
        Ok(self.store.list_blocks(owner_id).await?)
    }

    /// Inclusion proof for record `index` of a sealed block.
    pub async fn prove(
        &self,
        owner_id: &str,
        block_number: u64,
        index: usize,
    ) -> Result<Option<RecordProof>> {
        let Some(block) = self.store.get_block(owner_id, block_number).await? else {
            return Ok(None);
        };
        let header = block.header();
        let (Some(merkle_root), Some(record), Some(proof)) = (
            header.merkle_root,
            block.records().get(index),
            block.proof(index),
        ) else {
            return Ok(None);
        };
        Ok(Some(RecordProof {
            record: record.clone(),
            proof,
            merkle_root,
            block_hash: header.block_hash,
        }))
    }

    /// Replay the owner's persisted blocks: block numbers, links, Merkle
    /// roots, totals and block hashes.
    pub async fn audit_owner(&self, owner_id: &str) -> Result<BlockAudit> {
        let blocks = self.store.list_blocks(owner_id).await?;
        let violation = verify_block_chain(owner_id, &blocks).err();
        if let Some(violation) = &violation {
            warn!(owner = owner_id, %violation, "memory chain verification failed");
        }
        Ok(BlockAudit {
            owner_id: owner_id.to_string(),
            blocks_read: blocks.len() as u64,
            violation,
        })
    }

    pub async fn verify_owner(&self, owner_id: &str) -> Result<bool> {
        Ok(self.audit_owner(owner_id).await?.is_intact())
    }
}
