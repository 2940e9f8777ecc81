//! Typed circuit inputs
//!
//! One struct per circuit. Field names serialize to the circuit's signal
//! names and every value renders as a base-10 string, the form the witness
//! calculator reads. Keeping the signals in a struct (instead of a loose map)
//! means a missing or misspelled input is a compile error.

#![forbid(unsafe_code)]

use serde::{ser::SerializeSeq, Serialize, Serializer};

use crate::{field, F};

fn decimal<S: Serializer>(value: &F, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&field::to_decimal(value))
}

fn decimals<S: Serializer>(values: &[F], s: S) -> Result<S::Ok, S::Error> {
    let mut seq = s.serialize_seq(Some(values.len()))?;
    for v in values {
        seq.serialize_element(&field::to_decimal(v))?;
    }
    seq.end()
}

/// Circuits the backend knows how to prove.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Circuit {
    /// Stream registration.
    Create,
    /// Checkpoint transition (claim).
    Checkpoint,
}

impl Circuit {
    /// Artifact stem: `<name>.wasm` / `<name>.zkey`.
    pub fn name(self) -> &'static str {
        match self {
            Circuit::Create => "create",
            Circuit::Checkpoint => "checkpoint",
        }
    }

    /// Public inputs in the order the verifier takes them. A correct proof's
    /// public signals equal these signals' values, in this order.
    pub fn public_inputs(self) -> &'static [&'static str] {
        match self {
            Circuit::Create => &["publicAmount", "commitment"],
            Circuit::Checkpoint => &[
                "currentTime",
                "publicAmount",
                "streamRoot",
                "checkpointRoot",
                "inCheckpointNullifier",
                "outCheckpointCommitment",
            ],
        }
    }
}

impl core::fmt::Display for Circuit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Inputs of the stream registration circuit. Fields are the circuit's
/// signal names in snake case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct CreateWitness {
    #[serde(serialize_with = "decimal")]
    pub public_amount: F,
    #[serde(serialize_with = "decimal")]
    pub start_time: F,
    #[serde(serialize_with = "decimal")]
    pub stop_time: F,
    #[serde(serialize_with = "decimal")]
    pub rate: F,
    #[serde(serialize_with = "decimal")]
    pub sender_private_key: F,
    #[serde(serialize_with = "decimal")]
    pub receiver_public_key: F,
    #[serde(serialize_with = "decimal")]
    pub blinding: F,
    #[serde(serialize_with = "decimal")]
    pub commitment: F,
}

/// Inputs of the checkpoint transition circuit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ClaimWitness {
    #[serde(serialize_with = "decimal")]
    pub current_time: F,
    #[serde(serialize_with = "decimal")]
    pub public_amount: F,

    // stream
    #[serde(serialize_with = "decimal")]
    pub stream_root: F,
    #[serde(serialize_with = "decimal")]
    pub stream_rate: F,
    #[serde(serialize_with = "decimal")]
    pub stream_start_time: F,
    #[serde(serialize_with = "decimal")]
    pub stream_stop_time: F,
    #[serde(serialize_with = "decimal")]
    pub stream_blinding: F,
    #[serde(serialize_with = "decimal")]
    pub stream_sender_public_key: F,
    #[serde(serialize_with = "decimal")]
    pub stream_receiver_private_key: F,
    /// Leaf index; the circuit splits it into path bits.
    #[serde(serialize_with = "decimal")]
    pub stream_path_indices: F,
    #[serde(serialize_with = "decimals")]
    pub stream_path_elements: Vec<F>,

    // input checkpoint
    #[serde(serialize_with = "decimal")]
    pub checkpoint_root: F,
    #[serde(serialize_with = "decimal")]
    pub in_checkpoint_time: F,
    #[serde(serialize_with = "decimal")]
    pub in_checkpoint_blinding: F,
    #[serde(serialize_with = "decimal")]
    pub in_checkpoint_nullifier: F,
    #[serde(serialize_with = "decimal")]
    pub in_checkpoint_path_indices: F,
    #[serde(serialize_with = "decimals")]
    pub in_checkpoint_path_elements: Vec<F>,

    // output checkpoint
    #[serde(serialize_with = "decimal")]
    pub out_checkpoint_time: F,
    #[serde(serialize_with = "decimal")]
    pub out_checkpoint_blinding: F,
    #[serde(serialize_with = "decimal")]
    pub out_checkpoint_commitment: F,
}

/// Implemented by every witness struct.
pub trait CircuitWitness: Serialize {
    /// Circuit this witness is for.
    const CIRCUIT: Circuit;

    /// Signal map handed to the backend.
    fn to_signals(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl CircuitWitness for CreateWitness {
    const CIRCUIT: Circuit = Circuit::Create;
}

impl CircuitWitness for ClaimWitness {
    const CIRCUIT: Circuit = Circuit::Checkpoint;
}
