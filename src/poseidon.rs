//! Poseidon over the BN254 scalar field (circomlib parameters)
//!
//! Commitments, nullifiers, the hash-domain public key, and every internal
//! node of both commitment trees use this hash. It must agree bit-for-bit with
//! the circuit's `Poseidon(n)` template and the on-chain hasher contract, which
//! is why the circom parameter set from `light-poseidon` is used and nothing
//! else.

#![forbid(unsafe_code)]

use light_poseidon::{Poseidon, PoseidonError, PoseidonHasher};

use crate::F;

/// Largest arity the circom parameter set ships (width 13).
pub const MAX_INPUTS: usize = 12;

/// Errors surfaced by the hash wrapper.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Input count outside the shipped parameter sets.
    #[error("poseidon arity must be in 1..={max} (got {got})")]
    Arity {
        /// Inputs given.
        got: usize,
        /// Largest supported arity.
        max: usize,
    },
    /// Raised by the permutation itself.
    #[error("poseidon failure: {0}")]
    Poseidon(#[from] PoseidonError),
}

/// `Poseidon(inputs...)` with the circom round constants for `inputs.len()`.
pub fn hash(inputs: &[F]) -> Result<F, HashError> {
    if inputs.is_empty() || inputs.len() > MAX_INPUTS {
        return Err(HashError::Arity { got: inputs.len(), max: MAX_INPUTS });
    }
    let mut hasher = Poseidon::<F>::new_circom(inputs.len())?;
    Ok(hasher.hash(inputs)?)
}

/// Two-to-one compression used for Merkle nodes.
#[inline]
pub fn hash2(left: &F, right: &F) -> Result<F, HashError> {
    hash(&[*left, *right])
}
