//! Merkle trees over ordered record hashes.
//!
//! Leaves are combined pairwise with `SHA-256(left || right)`. A level with an
//! odd number of nodes duplicates its last node. A single leaf is its own root.
//! Leaf order matters: permuting leaves changes the root.

use serde::{Deserialize, Serialize};

use crate::crypto::Sha256Hash;

/// Compute the Merkle root of an ordered list of leaves.
///
/// Returns `None` for an empty list.
pub fn merkle_root(leaves: &[Sha256Hash]) -> Option<Sha256Hash> {
    if leaves.is_empty() {
        return None;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level.first().copied()
}

fn next_level(level: &[Sha256Hash]) -> Vec<Sha256Hash> {
    level
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            Sha256Hash::combine(left, right)
        })
        .collect()
}

/// Which side a sibling hash sits on when recomputing a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// An inclusion proof for one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Position of the leaf in the ordered list.
    pub index: usize,
    /// Sibling hashes from the leaf level up to just below the root.
    pub siblings: Vec<(Side, Sha256Hash)>,
}

impl MerkleProof {
    /// Check that `leaf` at `self.index` hashes up to `root`.
    pub fn verify(&self, leaf: &Sha256Hash, root: &Sha256Hash) -> bool {
        let computed = self
            .siblings
            .iter()
            .fold(*leaf, |acc, (side, sibling)| match side {
                Side::Left => Sha256Hash::combine(sibling, &acc),
                Side::Right => Sha256Hash::combine(&acc, sibling),
            });
        computed == *root
    }
}

/// A fully materialized tree, kept level by level.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Sha256Hash>>,
}

impl MerkleTree {
    /// Build the tree. Returns `None` for an empty leaf list.
    pub fn build(leaves: &[Sha256Hash]) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }
        let mut levels = vec![leaves.to_vec()];
        while let Some(last) = levels.last() {
            if last.len() <= 1 {
                break;
            }
            let next = next_level(last);
            levels.push(next);
        }
        Some(Self { levels })
    }

    /// The root hash.
    pub fn root(&self) -> Sha256Hash {
        self.levels
            .last()
            .and_then(|level| level.first().copied())
            .unwrap_or(Sha256Hash::ZERO)
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut siblings = Vec::new();
        let mut pos = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let entry = if pos % 2 == 0 {
                // Odd tail: the node is paired with itself.
                let sibling = level.get(pos + 1).unwrap_or(&level[pos]);
                (Side::Right, *sibling)
            } else {
                (Side::Left, level[pos - 1])
            };
            siblings.push(entry);
            pos /= 2;
        }
        Some(MerkleProof { index, siblings })
    }
}
