//! Fixed-arity binary Merkle tree over `hash2`, with deterministic
//! zero-padding to the next power of two (spec §4.4).

use crate::field::Fr;
use crate::hash::HashEngine;

#[derive(Debug, Clone)]
pub struct MerklePath {
    pub siblings: Vec<Fr>,
    pub indices: Vec<bool>,
}

pub struct MerkleBuilder {
    hasher: HashEngine,
}

impl Default for MerkleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MerkleBuilder {
    pub fn new() -> Self {
        Self {
            hasher: HashEngine::new(),
        }
    }

    fn padded_leaves(&self, leaves: &[Fr]) -> Vec<Fr> {
        if leaves.is_empty() {
            return Vec::new();
        }
        let size = leaves.len().next_power_of_two();
        let mut padded = leaves.to_vec();
        padded.resize(size, Fr::from(0u64));
        padded
    }

    /// Builds the full set of tree levels, leaves first, root last.
    fn levels(&self, leaves: &[Fr]) -> Vec<Vec<Fr>> {
        let padded = self.padded_leaves(leaves);
        if padded.is_empty() {
            return vec![vec![Fr::from(0u64)]];
        }
        let mut levels = vec![padded];
        while levels.last().unwrap().len() > 1 {
            let prev = levels.last().unwrap();
            let next: Vec<Fr> = prev
                .chunks(2)
                .map(|pair| self.hasher.hash2(pair[0], pair[1]))
                .collect();
            levels.push(next);
        }
        levels
    }

    /// Empty trees yield root = 0.
    pub fn root(&self, leaves: &[Fr]) -> Fr {
        let levels = self.levels(leaves);
        levels.last().unwrap()[0]
    }

    /// Extracts the sibling path for `leaf_index`. Returns `None` if the
    /// index is out of range for the (pre-padding) leaf count.
    pub fn path(&self, leaves: &[Fr], leaf_index: usize) -> Option<MerklePath> {
        if leaf_index >= leaves.len() {
            return None;
        }
        let levels = self.levels(leaves);
        let mut siblings = Vec::new();
        let mut indices = Vec::new();
        let mut idx = leaf_index;
        for level in &levels[..levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            siblings.push(level[sibling_idx]);
            indices.push(idx % 2 == 1);
            idx /= 2;
        }
        Some(MerklePath { siblings, indices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_root_is_zero() {
        let mb = MerkleBuilder::new();
        assert_eq!(mb.root(&[]), Fr::from(0u64));
    }

    #[test]
    fn single_leaf_root_equals_hash_of_leaf_and_zero_pad() {
        let mb = MerkleBuilder::new();
        let leaf = Fr::from(7u64);
        let hasher = HashEngine::new();
        assert_eq!(mb.root(&[leaf]), leaf);
        let _ = hasher; // single-leaf tree is just the leaf itself (size-1 power of two)
    }

    #[test]
    fn root_is_deterministic_for_same_leaf_order() {
        let mb = MerkleBuilder::new();
        let leaves: Vec<Fr> = (0..5).map(|i| Fr::from(i as u64)).collect();
        assert_eq!(mb.root(&leaves), mb.root(&leaves));
    }

    #[test]
    fn root_changes_with_leaf_order() {
        let mb = MerkleBuilder::new();
        let leaves = vec![Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)];
        let mut reordered = leaves.clone();
        reordered.swap(0, 1);
        assert_ne!(mb.root(&leaves), mb.root(&reordered));
    }

    #[test]
    fn path_verifies_against_root() {
        let mb = MerkleBuilder::new();
        let hasher = HashEngine::new();
        let leaves: Vec<Fr> = (0..3).map(|i| Fr::from(i as u64 + 1)).collect();
        let root = mb.root(&leaves);
        for idx in 0..leaves.len() {
            let path = mb.path(&leaves, idx).unwrap();
            let mut acc = leaves[idx];
            for (sibling, is_right) in path.siblings.iter().zip(path.indices.iter()) {
                acc = if *is_right {
                    hasher.hash2(*sibling, acc)
                } else {
                    hasher.hash2(acc, *sibling)
                };
            }
            assert_eq!(acc, root, "path for leaf {idx} did not verify");
        }
    }

    #[test]
    fn path_out_of_range_is_none() {
        let mb = MerkleBuilder::new();
        let leaves = vec![Fr::from(1u64)];
        assert!(mb.path(&leaves, 5).is_none());
    }
}
