//! Protocol constants shared with the ledger contracts.
//!
//! The zero leaves are the values an empty slot hashes as. They are derived
//! the way the contracts derive them, `keccak256(tag) mod FIELD_SIZE`, so a
//! locally replayed tree and the on-chain tree agree on every empty subtree.

#![forbid(unsafe_code)]

use ark_ff::PrimeField;
use sha3::{Digest, Keccak256};

use crate::F;

/// Depth of the stream commitment tree.
pub const STREAM_TREE_LEVELS: usize = 21;

/// Depth of the checkpoint commitment tree.
pub const CHECKPOINT_TREE_LEVELS: usize = 23;

/// Tag hashed into the stream tree's empty-leaf value.
pub const ZERO_LEAF_STREAM_TAG: &str = "privi-stream:stream";

/// Tag hashed into the checkpoint tree's empty-leaf value.
pub const ZERO_LEAF_CHECKPOINT_TAG: &str = "privi-stream:checkpoint";

/// `keccak256(tag) mod FIELD_SIZE`.
pub fn keccak_to_field(tag: &[u8]) -> F {
    let digest = Keccak256::digest(tag);
    F::from_be_bytes_mod_order(&digest)
}

/// Empty-leaf value of the stream tree.
pub fn zero_leaf_stream() -> F {
    keccak_to_field(ZERO_LEAF_STREAM_TAG.as_bytes())
}

/// Empty-leaf value of the checkpoint tree.
pub fn zero_leaf_checkpoint() -> F {
    keccak_to_field(ZERO_LEAF_CHECKPOINT_TAG.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{parse_decimal, to_fixed_hex};

    #[test]
    fn keccak_reduction_matches_known_tag() {
        // keccak256("tornado") mod p, the zero value of the pool this ledger descends from.
        let expected: F = parse_decimal(
            "21663839004416932945382355908790599225266501822907911457504978515578255421292",
        )
        .unwrap();
        assert_eq!(keccak_to_field(b"tornado"), expected);
    }

    #[test]
    fn zero_leaves_match_ledger_values() {
        assert_eq!(
            zero_leaf_stream(),
            parse_decimal::<F>(
                "12196988939770350633689535703017180717597670706232632932438783543043562913094"
            )
            .unwrap()
        );
        assert_eq!(
            zero_leaf_checkpoint(),
            parse_decimal::<F>(
                "1530156642264141191467982616798181361093383964264712858387734878468137631521"
            )
            .unwrap()
        );
    }

    #[test]
    fn zero_leaves_are_distinct() {
        assert_ne!(to_fixed_hex(&zero_leaf_stream()), to_fixed_hex(&zero_leaf_checkpoint()));
    }
}
