//! Poseidon Merkle tree over allow-list leaves.
//!
//! Leaves stay in insertion order; each pair is hashed as
//! `poseidon(min(a, b), max(a, b))`, so a proof carries no left/right flags
//! and verifies no matter where its leaf sat in the list. An odd node at the
//! end of a level is paired with zero. A single leaf is its own root.

use starknet_crypto::poseidon_hash;
use starknet_types_core::felt::Felt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("leaf {0} is not in the tree")]
    LeafNotFound(String),
}

/// Hash a pair in sorted order.
pub fn hash_pair(a: &Felt, b: &Felt) -> Felt {
    if a <= b {
        poseidon_hash(*a, *b)
    } else {
        poseidon_hash(*b, *a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves, the last level holds the root alone.
    levels: Vec<Vec<Felt>>,
}

impl MerkleTree {
    pub fn new(leaves: Vec<Felt>) -> Self {
        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|level| level.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&Felt::ZERO)))
                .collect();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn leaves(&self) -> &[Felt] {
        &self.levels[0]
    }

    /// Root of the tree; zero for an empty tree, which admits no proofs.
    pub fn root(&self) -> Felt {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(Felt::ZERO)
    }

    /// Sibling path from `leaf` up to the root.
    pub fn proof(&self, leaf: &Felt) -> Result<Vec<Felt>, MerkleError> {
        let mut index = self
            .leaves()
            .iter()
            .position(|candidate| candidate == leaf)
            .ok_or_else(|| MerkleError::LeafNotFound(leaf.to_hex_string()))?;

        let mut path = Vec::with_capacity(self.levels.len().saturating_sub(1));
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = index ^ 1;
            path.push(level.get(sibling).copied().unwrap_or(Felt::ZERO));
            index /= 2;
        }
        Ok(path)
    }
}

/// Fold `proof` from `leaf` and compare against `root`.
pub fn verify_proof(root: &Felt, leaf: &Felt, proof: &[Felt]) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |node, sibling| hash_pair(&node, sibling));
    computed == *root
}
