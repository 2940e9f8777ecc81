//! Crate root: public surface, core aliases, and protocol-wide invariants
//!
//! Off-chain core of a private payment-streaming protocol. A sender opens a
//! [`Stream`] (rate, time window, two parties) as a hiding commitment in the
//! ledger's stream tree. The receiver claims accrued value by advancing a
//! chain of [`Checkpoint`]s, each claim spending the previous checkpoint's
//! nullifier. Both note kinds are recovered by trial-decrypting the ledger's
//! published ciphertexts.
//!
//! ```text
//! ledger log ──► ledger::replay_tree ──► CommitmentTree (roots, paths)
//!            └─► scanner::NoteScanner ─► Stream / Checkpoint
//!                                             │
//!                prover::{StreamProver, CheckpointProver} ◄┘
//!                        │ typed witness
//!                        ▼
//!                backend::ProofBackend ──► verifier calldata
//! ```
//!
//! ## Invariants
//!
//! - **Field.** Every commitment input, public key, and blinding is an
//!   element of the BN254 scalar field ([`F`], modulus [`FIELD_SIZE`]).
//!   Values decoded from untrusted bytes are range-checked, never reduced.
//! - **Hash.** Poseidon with circomlib parameters, so local values agree with
//!   the circuit and the on-chain hasher.
//! - **Trees.** Depth, empty leaf, and child order match the ledger exactly.
//!   See [`merkle`].
//! - **No defaults for crypto inputs.** A missing leaf index, secret, or tree
//!   entry is an error; nothing is substituted.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Proof backend interface, calldata encoding, snarkjs backend.
pub mod backend;
/// Checkpoint note.
pub mod checkpoint;
/// Fixed-width payload layouts.
pub mod codec;
/// Environment configuration.
pub mod config;
/// Tree depths and zero leaves.
pub mod constants;
/// Sealed-box payload encryption.
pub mod encryption;
/// Error taxonomy.
pub mod error;
/// Field encodings and range-checked parsing.
pub mod field;
/// Identity keys (Full / Viewer / PublicOnly).
pub mod keys;
/// Ledger events, tree replay, nullifier oracle.
pub mod ledger;
/// Append-only commitment tree.
pub mod merkle;
/// Circom-compatible Poseidon.
pub mod poseidon;
/// Witness assembly and proving.
pub mod prover;
/// Trial-decryption note scanner.
pub mod scanner;
/// Stream note.
pub mod stream;
/// Typed circuit witnesses.
pub mod witness;

// ============================================================================
// Canonical aliases
// ============================================================================

/// Scalar field: commitments, nullifiers, keys, witnesses.
pub type F = ark_bn254::Fr;

/// Base field: proof coordinates.
pub type Fq = ark_bn254::Fq;

/// Order of [`F`], in decimal.
pub const FIELD_SIZE: &str =
    "21888242871839275222246405745257275088548364400416034343698204186575808495617";

// ============================================================================
// Root-level re-exports
// ============================================================================

pub use crate::backend::{
    BackendError, ProofBackend, ProverOutput, RawProof, SnarkjsBackend, SolidityProof,
};
pub use crate::checkpoint::Checkpoint;
pub use crate::config::{Config, ConfigError};
pub use crate::error::{Entity, Error, Result};
pub use crate::keys::{EncryptionKey, FullKeys, Identity, PublicKey, ViewerKeys};
pub use crate::ledger::{LeafEvent, NullifierOracle, SpentSet, TreeKind};
pub use crate::merkle::{CommitmentTree, MerklePath};
pub use crate::prover::{CheckpointProver, ClaimProof, ClaimRequest, CreateProof, StreamProver};
pub use crate::scanner::{filter_unspent, NoteScanner, SpendableNote};
pub use crate::stream::{Role, Stream};
pub use crate::witness::{Circuit, ClaimWitness, CreateWitness};

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::PrimeField;

    #[test]
    fn field_size_is_the_scalar_modulus() {
        assert_eq!(F::MODULUS.to_string(), FIELD_SIZE);
    }
}
