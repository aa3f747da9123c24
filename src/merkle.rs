//! Keccak Merkle tree with sorted pair hashing.
//!
//! Leaves are hashed pairwise in ascending order, so a proof is a flat list of
//! siblings with no left/right flags. An unpaired node is carried up unchanged.

use alloy_primitives::{B256, keccak256};

fn hash_pair(a: B256, b: B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo.as_slice());
    buf[32..].copy_from_slice(hi.as_slice());
    keccak256(buf)
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `layers[0]` holds the leaves, the last layer holds the root.
    layers: Vec<Vec<B256>>,
}

impl MerkleTree {
    pub fn new(leaves: Vec<B256>) -> Self {
        let mut layers = vec![leaves];
        while let Some(layer) = layers.last().filter(|l| l.len() > 1) {
            let next = layer
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => hash_pair(*a, *b),
                    _ => pair[0],
                })
                .collect();
            layers.push(next);
        }
        Self { layers }
    }

    /// Root of the tree; zero for an empty tree.
    pub fn root(&self) -> B256 {
        self.layers
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or_default()
    }

    /// Sibling path for the leaf at `index`.
    pub fn proof(&self, mut index: usize) -> Option<Vec<B256>> {
        if index >= self.layers.first()?.len() {
            return None;
        }
        let mut proof = Vec::new();
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = index ^ 1;
            if let Some(node) = layer.get(sibling) {
                proof.push(*node);
            }
            index /= 2;
        }
        Some(proof)
    }
}

pub fn verify_proof(root: B256, leaf: B256, proof: &[B256]) -> bool {
    proof.iter().fold(leaf, |acc, sibling| hash_pair(acc, *sibling)) == root
}
