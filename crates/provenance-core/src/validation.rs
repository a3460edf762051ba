//! Chain audits for the event log and memory block chains.
//!
//! Audits detect tampering, they do not prevent it. Nothing here runs during
//! append or seal; callers invoke audits explicitly.

use crate::block::MemoryBlock;
use crate::crypto::Sha256Hash;
use crate::error::IntegrityViolation;
use crate::event::LogEvent;

/// Outcome of replaying an event chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainAudit {
    /// Events that passed every check before the first violation.
    pub events_checked: u64,
    /// The first violation found, if any.
    pub broken_at: Option<IntegrityViolation>,
}

impl ChainAudit {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

/// Incremental event chain checker.
///
/// Feed events in storage order. The first violation is sticky.
#[derive(Debug, Clone)]
pub struct ChainAuditor {
    expected_sequence: u64,
    previous_hash: Sha256Hash,
    checked: u64,
    violation: Option<IntegrityViolation>,
}

impl Default for ChainAuditor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainAuditor {
    pub fn new() -> Self {
        Self {
            expected_sequence: 1,
            previous_hash: Sha256Hash::ZERO,
            checked: 0,
            violation: None,
        }
    }

    /// Check the next event. Returns `false` once the chain is broken.
    pub fn push(&mut self, event: &LogEvent) -> bool {
        self.push_checked(event, |_| Ok(()))
    }

    /// [`push`](Self::push) with an extra per-event check, run after the
    /// hash checks pass.
    pub fn push_checked(
        &mut self,
        event: &LogEvent,
        extra: impl FnOnce(&LogEvent) -> Result<(), IntegrityViolation>,
    ) -> bool {
        if self.violation.is_some() {
            return false;
        }
        match self.check(event).and_then(|hash| extra(event).map(|()| hash)) {
            Ok(hash) => {
                self.previous_hash = hash;
                self.expected_sequence += 1;
                self.checked += 1;
                true
            }
            Err(violation) => {
                self.violation = Some(violation);
                false
            }
        }
    }

    /// Record an entry that could not be read at all.
    pub fn push_unreadable(&mut self, reason: impl Into<String>) {
        if self.violation.is_none() {
            self.violation = Some(IntegrityViolation::Unreadable {
                position: self.expected_sequence,
                reason: reason.into(),
            });
        }
    }

    pub fn is_broken(&self) -> bool {
        self.violation.is_some()
    }

    pub fn finish(self) -> ChainAudit {
        ChainAudit {
            events_checked: self.checked,
            broken_at: self.violation,
        }
    }

    fn check(&self, event: &LogEvent) -> Result<Sha256Hash, IntegrityViolation> {
        let sequence = event.sequence;
        if sequence != self.expected_sequence {
            return Err(IntegrityViolation::SequenceGap {
                expected: self.expected_sequence,
                found: sequence,
            });
        }
        if event.previous_event_hash != self.previous_hash {
            return Err(IntegrityViolation::BrokenLink { sequence });
        }
        let recomputed = event
            .compute_hash()
            .map_err(|e| IntegrityViolation::Unreadable {
                position: sequence,
                reason: e.to_string(),
            })?;
        if recomputed != event.resource_hash {
            return Err(IntegrityViolation::ResourceHashMismatch { sequence });
        }
        Ok(recomputed)
    }
}

/// Replay an in-memory event chain.
pub fn audit_event_chain<'a>(events: impl IntoIterator<Item = &'a LogEvent>) -> ChainAudit {
    let mut auditor = ChainAuditor::new();
    for event in events {
        if !auditor.push(event) {
            break;
        }
    }
    auditor.finish()
}

/// Verify an owner's sealed blocks, ordered by block number.
pub fn verify_block_chain(
    owner_id: &str,
    blocks: &[MemoryBlock],
) -> Result<(), IntegrityViolation> {
    let mut previous_hash = MemoryBlock::genesis_link(owner_id);

    for (index, block) in blocks.iter().enumerate() {
        let header = block.header();
        let block_number = header.block_number;

        if header.owner_id != owner_id {
            return Err(IntegrityViolation::OwnerMismatch {
                block_number,
                expected: owner_id.to_string(),
                found: header.owner_id.clone(),
            });
        }
        if block_number != index as u64 {
            return Err(IntegrityViolation::BlockNumberGap {
                expected: index as u64,
                found: block_number,
            });
        }
        if header.previous_hash != previous_hash {
            return Err(IntegrityViolation::BlockLinkMismatch { block_number });
        }
        block.verify()?;
        previous_hash = header.block_hash;
    }

    Ok(())
}
