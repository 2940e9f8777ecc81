//! Append-only commitment tree, replicated from the ledger's insert order
//!
//! Layout matches the on-chain fixed-depth tree exactly:
//!
//! - `zeros[0]` is the tree's empty-leaf constant and
//!   `zeros[i] = H(zeros[i-1], zeros[i-1])`.
//! - Layer `l+1` node `i` is `H(layer_l[2i], layer_l[2i+1])`: the even index
//!   is the left child. A missing right child is `zeros[l]`.
//! - The root of an empty tree is `zeros[levels]`.
//! - Paths run leaf to root. `path_indices[l]` is bit `l` of the leaf index
//!   (0 = the node is a left child).
//!
//! Any divergence from this (other hash, other zero, swapped children) gives
//! a root the ledger never had, and proofs built against it fail on-chain
//! only.

#![forbid(unsafe_code)]

use ark_ff::Zero;

use crate::{
    poseidon::{self, HashError},
    F,
};

/// Largest depth accepted; keeps `capacity()` inside `u64`.
pub const MAX_LEVELS: usize = 32;

/// Two-to-one node hash.
pub type HashFn = fn(&F, &F) -> Result<F, HashError>;

/// Tree construction and query failures.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Depth outside `1..=MAX_LEVELS`.
    #[error("tree depth must be in 1..={max} (got {got})")]
    Levels {
        /// Requested depth.
        got: usize,
        /// Largest supported depth.
        max: usize,
    },
    /// No free leaf left.
    #[error("tree is full ({capacity} leaves)")]
    Full {
        /// `2^levels`.
        capacity: u64,
    },
    /// Path requested for a leaf not yet inserted.
    #[error("leaf index {index} out of bounds (tree holds {len} leaves)")]
    IndexOutOfBounds {
        /// Requested index.
        index: u64,
        /// Leaves inserted.
        len: u64,
    },
    /// Node hash failure.
    #[error(transparent)]
    Hash(#[from] HashError),
}

// ============================================================================
// Inclusion witness
// ============================================================================

/// Sibling hashes and direction bits, leaf to root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerklePath {
    /// Sibling at each level.
    pub path_elements: Vec<F>,
    /// 1 where the path node is a right child.
    pub path_indices: Vec<u8>,
    /// Leaf position the path was taken for.
    pub leaf_index: u64,
}

impl MerklePath {
    /// Witness for a leaf that is not in any tree (the zero checkpoint).
    pub fn all_zero(levels: usize) -> Self {
        Self {
            path_elements: vec![F::zero(); levels],
            path_indices: vec![0; levels],
            leaf_index: 0,
        }
    }

    /// Path length.
    pub fn levels(&self) -> usize {
        self.path_elements.len()
    }

    /// Fold `leaf` up the path.
    pub fn compute_root(&self, leaf: &F, hasher: HashFn) -> Result<F, HashError> {
        let mut node = *leaf;
        for (sibling, bit) in self.path_elements.iter().zip(&self.path_indices) {
            node = if *bit == 0 { hasher(&node, sibling)? } else { hasher(sibling, &node)? };
        }
        Ok(node)
    }
}

// ============================================================================
// Tree
// ============================================================================

/// Fixed-depth append-only tree holding every layer.
#[derive(Clone, Debug)]
pub struct CommitmentTree {
    levels: usize,
    hasher: HashFn,
    zeros: Vec<F>,
    layers: Vec<Vec<F>>,
}

impl CommitmentTree {
    /// Empty Poseidon tree of depth `levels` whose empty leaf is `zero_leaf`.
    pub fn new(levels: usize, zero_leaf: F) -> Result<Self, TreeError> {
        Self::with_hasher(levels, zero_leaf, poseidon::hash2)
    }

    /// Empty tree with a custom node hash.
    pub fn with_hasher(levels: usize, zero_leaf: F, hasher: HashFn) -> Result<Self, TreeError> {
        if levels == 0 || levels > MAX_LEVELS {
            return Err(TreeError::Levels { got: levels, max: MAX_LEVELS });
        }
        let mut zeros = Vec::with_capacity(levels + 1);
        zeros.push(zero_leaf);
        for i in 1..=levels {
            let prev = zeros[i - 1];
            zeros.push(hasher(&prev, &prev)?);
        }
        Ok(Self { levels, hasher, zeros, layers: vec![Vec::new(); levels + 1] })
    }

    /// Replay `leaves` in index order.
    pub fn from_leaves(leaves: &[F], levels: usize, zero_leaf: F) -> Result<Self, TreeError> {
        let mut tree = Self::new(levels, zero_leaf)?;
        tree.bulk_insert(leaves)?;
        Ok(tree)
    }

    /// Depth.
    #[inline]
    pub fn levels(&self) -> usize {
        self.levels
    }

    /// `2^levels`.
    #[inline]
    pub fn capacity(&self) -> u64 {
        1u64 << self.levels
    }

    /// Leaves inserted so far.
    #[inline]
    pub fn len(&self) -> u64 {
        self.layers[0].len() as u64
    }

    /// No leaves yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    /// Empty-subtree roots, `zeros[0]` the empty leaf.
    #[inline]
    pub fn zeros(&self) -> &[F] {
        &self.zeros
    }

    /// Node hash.
    #[inline]
    pub fn hasher(&self) -> HashFn {
        self.hasher
    }

    /// Leaves in insertion order.
    pub fn leaves(&self) -> &[F] {
        &self.layers[0]
    }

    /// Current root; `zeros[levels]` when empty.
    pub fn root(&self) -> F {
        self.layers[self.levels].first().copied().unwrap_or(self.zeros[self.levels])
    }

    /// Append one leaf and return its index.
    ///
    /// The new path is hashed before any layer is touched, so a failed
    /// insert leaves the tree unchanged.
    pub fn insert(&mut self, leaf: F) -> Result<u64, TreeError> {
        let index = self.len();
        if index >= self.capacity() {
            return Err(TreeError::Full { capacity: self.capacity() });
        }

        let mut updates = Vec::with_capacity(self.levels);
        let mut node = leaf;
        let mut i = index as usize;
        for level in 0..self.levels {
            let sibling = self.layers[level].get(i ^ 1).copied().unwrap_or(self.zeros[level]);
            // `i ^ 1` is only an existing node when `i` is odd.
            node = if i & 1 == 0 {
                (self.hasher)(&node, &self.zeros[level])?
            } else {
                (self.hasher)(&sibling, &node)?
            };
            i >>= 1;
            updates.push((i, node));
        }

        self.layers[0].push(leaf);
        for (level, (i, value)) in updates.into_iter().enumerate() {
            let layer = &mut self.layers[level + 1];
            if i < layer.len() {
                layer[i] = value;
            } else {
                layer.push(value);
            }
        }
        Ok(index)
    }

    /// Append several leaves in order. Fails up front if they do not fit.
    pub fn bulk_insert(&mut self, leaves: &[F]) -> Result<(), TreeError> {
        if self.len() + leaves.len() as u64 > self.capacity() {
            return Err(TreeError::Full { capacity: self.capacity() });
        }
        for leaf in leaves {
            self.insert(*leaf)?;
        }
        Ok(())
    }

    /// Position of `leaf`, or `None`. Callers with a zero checkpoint must
    /// branch before asking.
    pub fn index_of(&self, leaf: &F) -> Option<u64> {
        self.layers[0].iter().position(|l| l == leaf).map(|i| i as u64)
    }

    /// Inclusion witness for the leaf at `index`.
    pub fn path(&self, index: u64) -> Result<MerklePath, TreeError> {
        if index >= self.len() {
            return Err(TreeError::IndexOutOfBounds { index, len: self.len() });
        }
        let mut path_elements = Vec::with_capacity(self.levels);
        let mut path_indices = Vec::with_capacity(self.levels);
        let mut i = index as usize;
        for level in 0..self.levels {
            path_indices.push((i & 1) as u8);
            path_elements.push(self.layers[level].get(i ^ 1).copied().unwrap_or(self.zeros[level]));
            i >>= 1;
        }
        Ok(MerklePath { path_elements, path_indices, leaf_index: index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::{
            zero_leaf_checkpoint, zero_leaf_stream, CHECKPOINT_TREE_LEVELS, STREAM_TREE_LEVELS,
        },
        field::parse_decimal,
    };

    fn leaf(n: u64) -> F {
        F::from(n)
    }

    #[test]
    fn empty_roots_at_ledger_depths() {
        let stream = CommitmentTree::new(STREAM_TREE_LEVELS, zero_leaf_stream()).unwrap();
        assert_eq!(
            stream.root(),
            parse_decimal::<F>(
                "20686907421964708857705082580750539511400940767109920185645252705866047521567"
            )
            .unwrap()
        );
        let checkpoint =
            CommitmentTree::new(CHECKPOINT_TREE_LEVELS, zero_leaf_checkpoint()).unwrap();
        assert_eq!(
            checkpoint.root(),
            parse_decimal::<F>(
                "8520875224539219037964474168242281497147912915333822122404166065735409703999"
            )
            .unwrap()
        );
    }

    #[test]
    fn empty_root_is_top_zero() {
        let t = CommitmentTree::new(4, F::from(42u64)).unwrap();
        assert_eq!(t.root(), t.zeros()[4]);
        assert_eq!(t.capacity(), 16);
        assert!(t.is_empty());
    }

    #[test]
    fn depth_is_bounded() {
        assert!(matches!(CommitmentTree::new(0, F::zero()), Err(TreeError::Levels { .. })));
        assert!(CommitmentTree::new(MAX_LEVELS + 1, F::zero()).is_err());
    }

    #[test]
    fn two_leaf_root_by_hand() {
        let z = F::from(42u64);
        let t = CommitmentTree::from_leaves(&[leaf(1), leaf(2)], 2, z).unwrap();
        let h = poseidon::hash2;
        let z1 = h(&z, &z).unwrap();
        let expected = h(&h(&leaf(1), &leaf(2)).unwrap(), &z1).unwrap();
        assert_eq!(t.root(), expected);
    }

    #[test]
    fn append_is_consistent_with_rebuild() {
        let z = zero_leaf_stream();
        let mut incremental = CommitmentTree::from_leaves(&[leaf(1), leaf(2)], 6, z).unwrap();
        incremental.insert(leaf(3)).unwrap();
        let direct = CommitmentTree::from_leaves(&[leaf(1), leaf(2), leaf(3)], 6, z).unwrap();
        assert_eq!(incremental.root(), direct.root());
        assert_eq!(incremental.leaves(), direct.leaves());
    }

    #[test]
    fn every_path_folds_to_root() {
        let z = F::from(7u64);
        let leaves: Vec<F> = (10..17).map(leaf).collect();
        let t = CommitmentTree::from_leaves(&leaves, 5, z).unwrap();
        for (i, l) in leaves.iter().enumerate() {
            let p = t.path(i as u64).unwrap();
            assert_eq!(p.levels(), 5);
            assert_eq!(p.leaf_index, i as u64);
            assert_eq!(p.compute_root(l, t.hasher()).unwrap(), t.root());
        }
    }

    #[test]
    fn path_bits_are_leaf_index_bits() {
        let t = CommitmentTree::from_leaves(&(0..6).map(leaf).collect::<Vec<_>>(), 3, F::zero())
            .unwrap();
        let p = t.path(5).unwrap();
        assert_eq!(p.path_indices, vec![1, 0, 1]);
        assert_eq!(p.path_elements[0], leaf(4));
    }

    #[test]
    fn index_of_and_out_of_bounds() {
        let t = CommitmentTree::from_leaves(&[leaf(5), leaf(6)], 3, F::zero()).unwrap();
        assert_eq!(t.index_of(&leaf(6)), Some(1));
        assert_eq!(t.index_of(&leaf(99)), None);
        assert!(matches!(t.path(2), Err(TreeError::IndexOutOfBounds { index: 2, len: 2 })));
    }

    #[test]
    fn full_tree_rejects_inserts() {
        let mut t = CommitmentTree::from_leaves(&[leaf(1), leaf(2)], 1, F::zero()).unwrap();
        assert!(matches!(t.insert(leaf(3)), Err(TreeError::Full { capacity: 2 })));
        let mut t = CommitmentTree::new(1, F::zero()).unwrap();
        assert!(t.bulk_insert(&[leaf(1), leaf(2), leaf(3)]).is_err());
        assert!(t.is_empty());
    }

    #[test]
    fn all_zero_path_shape() {
        let p = MerklePath::all_zero(23);
        assert_eq!(p.path_elements.len(), 23);
        assert!(p.path_elements.iter().all(|e| e.is_zero()));
        assert!(p.path_indices.iter().all(|b| *b == 0));
        assert_eq!(p.leaf_index, 0);
    }
}
