//! Proof assembly for stream creation and checkpoint claims
//!
//! Each prover builds its circuit witness from notes and tree snapshots,
//! runs every check it can *before* calling the backend (a bad witness
//! costs seconds of proving and then fails on-chain), and re-encodes the
//! result as verifier calldata plus the transaction's side data.
//!
//! The backend is injected. Provers hold no shared mutable state, and the
//! trees are borrowed snapshots, so concurrent claims are independent.

#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tracing::info;

use crate::{
    backend::{prove_checked, ProofBackend, ProverOutput, SolidityProof},
    checkpoint::Checkpoint,
    config::Config,
    error::{Entity, Error, Result},
    field::{self, FieldError},
    merkle::{CommitmentTree, MerklePath},
    stream::Stream,
    witness::{ClaimWitness, CircuitWitness, CreateWitness},
    F,
};

/// 20-byte account address (recipient, relayer).
pub type Address = [u8; 20];

fn amount_hex(v: u128) -> Result<String> {
    let bytes = field::u128_to_fixed::<32>(v)
        .map_err(|e: FieldError| Error::validation(Entity::Claim, e.to_string()))?;
    Ok(field::bytes_to_hex(&bytes))
}

fn signals<W: CircuitWitness>(w: &W) -> Result<serde_json::Value> {
    w.to_signals().map_err(|e| Error::Backend(e.into()))
}

// ============================================================================
// Stream creation
// ============================================================================

/// `createStream` proof arguments, field names as the contract takes them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct CreateProofArgs {
    pub proof: SolidityProof,
    pub public_amount: String,
    pub commitment: String,
}

/// The two stream ciphertexts, hex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct CreateData {
    pub encrypted_data_sender: String,
    pub encrypted_data_receiver: String,
}

/// Everything `createStream` needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProof {
    /// Proof and public inputs.
    pub proof_args: CreateProofArgs,
    /// Ciphertexts to publish.
    pub create_data: CreateData,
}

/// Proves stream creation.
pub struct StreamProver {
    backend: Arc<dyn ProofBackend>,
    timeout: Option<Duration>,
}

impl StreamProver {
    /// Prover on `backend`, bounded by `timeout` when set.
    pub fn new(backend: Arc<dyn ProofBackend>, timeout: Option<Duration>) -> Self {
        Self { backend, timeout }
    }

    /// Prover with the configured timeout.
    pub fn from_config(backend: Arc<dyn ProofBackend>, cfg: &Config) -> Self {
        Self::new(backend, cfg.prover_timeout)
    }

    /// Only the sender can register a stream, so the sender's secret is
    /// required.
    pub fn prepare_create_witness(&self, stream: &Stream) -> Result<CreateWitness> {
        let sender_secret = *stream
            .sender()
            .secret()
            .map_err(|_| Error::missing(Entity::Stream, "sender secret"))?;
        Ok(CreateWitness {
            public_amount: F::from(stream.amount()),
            start_time: F::from(stream.start_time()),
            stop_time: F::from(stream.stop_time()),
            rate: F::from(stream.rate()),
            sender_private_key: sender_secret,
            receiver_public_key: stream.receiver().public_key().to_field(),
            blinding: *stream.blinding(),
            commitment: stream.commitment()?,
        })
    }

    /// Prove the create witness and seal the stream for both parties.
    pub async fn prove_create(&self, stream: &Stream) -> Result<CreateProof> {
        let witness = self.prepare_create_witness(stream)?;
        let encrypted_data_sender = field::bytes_to_hex(&stream.encrypt_for_sender()?);
        let encrypted_data_receiver = field::bytes_to_hex(&stream.encrypt_for_receiver()?);

        let ProverOutput { proof, .. } = prove_checked(
            self.backend.as_ref(),
            CreateWitness::CIRCUIT,
            &signals(&witness)?,
            self.timeout,
        )
        .await?;

        Ok(CreateProof {
            proof_args: CreateProofArgs {
                proof: proof.to_solidity(),
                public_amount: field::to_fixed_hex(&witness.public_amount),
                commitment: field::to_fixed_hex(&witness.commitment),
            },
            create_data: CreateData { encrypted_data_sender, encrypted_data_receiver },
        })
    }
}

// ============================================================================
// Checkpoint claims
// ============================================================================

/// What the receiver wants out of one claim.
#[derive(Clone, Debug)]
pub struct ClaimRequest<'a> {
    /// Checkpoint being spent; the zero checkpoint on a first claim.
    pub input: &'a Checkpoint,
    /// Checkpoint being created.
    pub output: &'a Checkpoint,
    /// Ledger time the proof is made for.
    pub current_time: u64,
    /// Paid to `recipient`.
    pub withdraw_amount: u128,
    /// Paid to `relayer`.
    pub fee: u128,
    /// Withdrawal address.
    pub recipient: Address,
    /// Relayer address, zero when self-submitted.
    pub relayer: Address,
}

/// `withdraw` proof arguments, in the contract's order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ClaimProofArgs {
    pub proof: SolidityProof,
    pub current_time: u64,
    pub public_amount: String,
    pub stream_root: String,
    pub checkpoint_root: String,
    pub in_checkpoint_nullifier: String,
    pub out_checkpoint_commitment: String,
}

/// Payout parameters bound into the public amount, plus the new checkpoint
/// ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct WithdrawData {
    pub recipient: String,
    pub withdraw_amount: String,
    pub relayer: String,
    pub fee: String,
    pub encrypted_data: String,
}

/// Everything `withdraw` needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimProof {
    /// Proof and public inputs.
    pub proof_args: ClaimProofArgs,
    /// Payout and ciphertext.
    pub withdraw_data: WithdrawData,
}

/// Proves checkpoint claims.
pub struct CheckpointProver {
    backend: Arc<dyn ProofBackend>,
    timeout: Option<Duration>,
}

impl CheckpointProver {
    /// Prover on `backend`, bounded by `timeout` when set.
    pub fn new(backend: Arc<dyn ProofBackend>, timeout: Option<Duration>) -> Self {
        Self { backend, timeout }
    }

    /// Prover with the configured timeout.
    pub fn from_config(backend: Arc<dyn ProofBackend>, cfg: &Config) -> Self {
        Self::new(backend, cfg.prover_timeout)
    }

    /// Build the claim witness against point-in-time tree snapshots.
    ///
    /// Steps, all before any proving:
    /// 1. input checkpoint: all-zero path at index 0 if it is the zero
    ///    checkpoint, else its real path ([`Error::NotFound`] if absent);
    /// 2. stream: its real path in the stream tree ([`Error::NotFound`] if absent);
    /// 3. ordering and amount checks ([`Error::Validation`]);
    /// 4. receiver secret ([`Error::MissingDependency`] if absent).
    pub fn prepare_claim_witness(
        &self,
        stream_tree: &CommitmentTree,
        checkpoint_tree: &CommitmentTree,
        req: &ClaimRequest<'_>,
    ) -> Result<ClaimWitness> {
        let (input, output) = (req.input, req.output);
        let stream = input.stream();

        // 1
        let (input, in_path) = if input.is_zero() {
            (input.clone().with_leaf_index(0), MerklePath::all_zero(checkpoint_tree.levels()))
        } else {
            let commitment = input.commitment()?;
            let index = checkpoint_tree.index_of(&commitment).ok_or_else(|| Error::NotFound {
                tree: "checkpoint",
                leaf: field::to_fixed_hex(&commitment),
            })?;
            (input.clone().with_leaf_index(index), checkpoint_tree.path(index)?)
        };

        // 2
        let stream_commitment = stream.commitment()?;
        let stream_index =
            stream_tree.index_of(&stream_commitment).ok_or_else(|| Error::NotFound {
                tree: "stream",
                leaf: field::to_fixed_hex(&stream_commitment),
            })?;
        let stream_path = stream_tree.path(stream_index)?;

        // 3
        if output.stream().commitment()? != stream_commitment {
            return Err(Error::validation(
                Entity::Claim,
                "input and output checkpoints belong to different streams",
            ));
        }
        if output.checkpoint_time() > req.current_time {
            return Err(Error::validation(
                Entity::Claim,
                format!(
                    "output checkpoint time {} is after current time {}",
                    output.checkpoint_time(),
                    req.current_time
                ),
            ));
        }
        let accrued = output.claimable_since(&input)?;
        let public_amount = req
            .withdraw_amount
            .checked_add(req.fee)
            .ok_or_else(|| Error::validation(Entity::Claim, "withdraw amount + fee overflows"))?;
        if public_amount != accrued {
            return Err(Error::validation(
                Entity::Claim,
                format!("withdraw amount + fee is {public_amount}, accrued value is {accrued}"),
            ));
        }

        // 4
        let receiver_secret = *output
            .owner()
            .secret()
            .map_err(|_| Error::missing(Entity::Claim, "receiver secret"))?;

        Ok(ClaimWitness {
            current_time: F::from(req.current_time),
            public_amount: F::from(public_amount),
            stream_root: stream_tree.root(),
            stream_rate: F::from(stream.rate()),
            stream_start_time: F::from(stream.start_time()),
            stream_stop_time: F::from(stream.stop_time()),
            stream_blinding: *stream.blinding(),
            stream_sender_public_key: stream.sender().public_key().to_field(),
            stream_receiver_private_key: receiver_secret,
            stream_path_indices: F::from(stream_path.leaf_index),
            stream_path_elements: stream_path.path_elements,
            checkpoint_root: checkpoint_tree.root(),
            in_checkpoint_time: F::from(input.checkpoint_time()),
            in_checkpoint_blinding: *input.blinding(),
            in_checkpoint_nullifier: input.nullifier()?,
            in_checkpoint_path_indices: F::from(in_path.leaf_index),
            in_checkpoint_path_elements: in_path.path_elements,
            out_checkpoint_time: F::from(output.checkpoint_time()),
            out_checkpoint_blinding: *output.blinding(),
            out_checkpoint_commitment: output.commitment()?,
        })
    }

    /// Prove one claim and seal the output checkpoint to its owner.
    pub async fn prove_claim(
        &self,
        stream_tree: &CommitmentTree,
        checkpoint_tree: &CommitmentTree,
        req: &ClaimRequest<'_>,
    ) -> Result<ClaimProof> {
        let witness = self.prepare_claim_witness(stream_tree, checkpoint_tree, req)?;
        let encrypted_data = field::bytes_to_hex(&req.output.encrypt()?);
        info!(
            in_zero = req.input.is_zero(),
            out_time = req.output.checkpoint_time(),
            "assembling checkpoint claim"
        );

        let ProverOutput { proof, .. } = prove_checked(
            self.backend.as_ref(),
            ClaimWitness::CIRCUIT,
            &signals(&witness)?,
            self.timeout,
        )
        .await?;

        Ok(ClaimProof {
            proof_args: ClaimProofArgs {
                proof: proof.to_solidity(),
                current_time: req.current_time,
                public_amount: field::to_fixed_hex(&witness.public_amount),
                stream_root: field::to_fixed_hex(&witness.stream_root),
                checkpoint_root: field::to_fixed_hex(&witness.checkpoint_root),
                in_checkpoint_nullifier: field::to_fixed_hex(&witness.in_checkpoint_nullifier),
                out_checkpoint_commitment: field::to_fixed_hex(&witness.out_checkpoint_commitment),
            },
            withdraw_data: WithdrawData {
                recipient: field::bytes_to_hex(&req.recipient),
                withdraw_amount: amount_hex(req.withdraw_amount)?,
                relayer: field::bytes_to_hex(&req.relayer),
                fee: amount_hex(req.fee)?,
                encrypted_data,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{BackendError, RawProof},
        constants::{zero_leaf_checkpoint, zero_leaf_stream},
        keys::{FullKeys, Identity},
        witness::Circuit,
    };
    use ark_bn254::{G1Affine, G2Affine};
    use ark_ec::AffineRepr;
    use ark_ff::Zero;
    use async_trait::async_trait;
    use rand::rngs::OsRng;
    use std::sync::Mutex;

    /// Records what it was asked to prove and returns the generator points.
    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(Circuit, serde_json::Value)>>,
    }

    #[async_trait]
    impl ProofBackend for Recording {
        async fn prove(
            &self,
            circuit: Circuit,
            signals: &serde_json::Value,
        ) -> Result<ProverOutput, BackendError> {
            self.calls.lock().unwrap().push((circuit, signals.clone()));
            let public_signals = circuit
                .public_inputs()
                .iter()
                .map(|name| field::parse_decimal(signals[*name].as_str().unwrap()).unwrap())
                .collect();
            Ok(ProverOutput { proof: generator_proof(), public_signals })
        }
    }

    /// Proves something other than what it was asked to.
    struct Substituting;

    #[async_trait]
    impl ProofBackend for Substituting {
        async fn prove(
            &self,
            _: Circuit,
            _: &serde_json::Value,
        ) -> Result<ProverOutput, BackendError> {
            Ok(ProverOutput {
                proof: generator_proof(),
                public_signals: vec![F::from(123_456u64)],
            })
        }
    }

    fn generator_proof() -> RawProof {
        let (g1, g2) = (G1Affine::generator(), G2Affine::generator());
        RawProof {
            a: [g1.x, g1.y],
            b: [[g2.x.c0, g2.x.c1], [g2.y.c0, g2.y.c1]],
            c: [g1.x, g1.y],
        }
    }

    struct Fixture {
        sender: Identity,
        receiver: Identity,
        stream: Arc<Stream>,
        stream_tree: CommitmentTree,
        checkpoint_tree: CommitmentTree,
    }

    fn fixture() -> Fixture {
        let sender = Identity::Full(FullKeys::random(&mut OsRng).unwrap());
        let receiver = Identity::Full(FullKeys::random(&mut OsRng).unwrap());
        let s = Stream::create(10, 1000, 2000, sender.clone(), receiver.clone(), None).unwrap();
        let stream_tree = CommitmentTree::from_leaves(
            &[F::from(1u64), s.commitment().unwrap()],
            8,
            zero_leaf_stream(),
        )
        .unwrap();
        Fixture {
            sender,
            receiver,
            stream: Arc::new(s.with_leaf_index(1)),
            stream_tree,
            checkpoint_tree: CommitmentTree::new(8, zero_leaf_checkpoint()).unwrap(),
        }
    }

    fn request<'a>(
        input: &'a Checkpoint,
        output: &'a Checkpoint,
        amount: u128,
    ) -> ClaimRequest<'a> {
        ClaimRequest {
            input,
            output,
            current_time: 1600,
            withdraw_amount: amount,
            fee: 0,
            recipient: [0x11; 20],
            relayer: [0; 20],
        }
    }

    fn prover(backend: Arc<Recording>) -> CheckpointProver {
        CheckpointProver::new(backend, None)
    }

    #[test]
    fn create_witness_needs_sender_secret() {
        let f = fixture();
        let p = StreamProver::new(Arc::new(Recording::default()), None);
        let w = p.prepare_create_witness(&f.stream).unwrap();
        assert_eq!(w.public_amount, F::from(10_000u64));
        assert_eq!(w.sender_private_key, *f.sender.secret().unwrap());

        let viewer = Identity::from_public_key(f.sender.public_key());
        let s = Stream::create(10, 1000, 2000, viewer, f.receiver, None).unwrap();
        assert!(matches!(
            p.prepare_create_witness(&s),
            Err(Error::MissingDependency { what: "sender secret", .. })
        ));
    }

    #[tokio::test]
    async fn create_proof_outputs() {
        let f = fixture();
        let backend = Arc::new(Recording::default());
        let p = StreamProver::new(backend.clone(), None);
        let out = p.prove_create(&f.stream).await.unwrap();
        let commitment = f.stream.commitment().unwrap();
        assert_eq!(out.proof_args.commitment, field::to_fixed_hex(&commitment));
        assert!(out.create_data.encrypted_data_sender.starts_with("0x"));

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].0, Circuit::Create);
        assert_eq!(calls[0].1["publicAmount"], "10000");
    }

    #[test]
    fn zero_input_uses_all_zero_path() {
        let f = fixture();
        let zero = Checkpoint::zero(f.stream.clone());
        let out = Checkpoint::create(f.stream.clone(), 1500, f.receiver.clone(), None).unwrap();
        let w = prover(Arc::new(Recording::default()))
            .prepare_claim_witness(&f.stream_tree, &f.checkpoint_tree, &request(&zero, &out, 5000))
            .unwrap();

        assert_eq!(w.in_checkpoint_path_elements, vec![F::zero(); 8]);
        assert_eq!(w.in_checkpoint_path_indices, F::zero());
        assert_eq!(w.stream_path_indices, F::from(1u64));
        assert_eq!(w.public_amount, F::from(5000u64));
        assert_eq!(
            w.in_checkpoint_nullifier,
            crate::poseidon::hash(&[zero.commitment().unwrap(), *zero.blinding(), F::zero()])
                .unwrap()
        );
        assert_eq!(w.checkpoint_root, f.checkpoint_tree.root());
    }

    #[test]
    fn claim_checks_run_before_proving() {
        let f = fixture();
        let p = prover(Arc::new(Recording::default()));
        let zero = Checkpoint::zero(f.stream.clone());
        let out = Checkpoint::create(f.stream.clone(), 1500, f.receiver.clone(), None).unwrap();
        let trees = (&f.stream_tree, &f.checkpoint_tree);

        // wrong amount
        let err =
            p.prepare_claim_witness(trees.0, trees.1, &request(&zero, &out, 4999)).unwrap_err();
        assert!(matches!(err, Error::Validation { entity: Entity::Claim, .. }));

        // future-dated output
        let mut req = request(&zero, &out, 5000);
        req.current_time = 1499;
        assert!(matches!(
            p.prepare_claim_witness(trees.0, trees.1, &req),
            Err(Error::Validation { .. })
        ));

        // non-zero input not in the tree
        let mid = Checkpoint::create(f.stream.clone(), 1200, f.receiver.clone(), None).unwrap();
        assert!(matches!(
            p.prepare_claim_witness(trees.0, trees.1, &request(&mid, &out, 3000)),
            Err(Error::NotFound { tree: "checkpoint", .. })
        ));

        // stream missing from the stream tree
        let empty = CommitmentTree::new(8, zero_leaf_stream()).unwrap();
        assert!(matches!(
            p.prepare_claim_witness(&empty, trees.1, &request(&zero, &out, 5000)),
            Err(Error::NotFound { tree: "stream", .. })
        ));
    }

    #[tokio::test]
    async fn claim_from_inserted_checkpoint() {
        let mut f = fixture();
        let backend = Arc::new(Recording::default());
        let p = prover(backend.clone());

        let mid = Checkpoint::create(f.stream.clone(), 1200, f.receiver.clone(), None).unwrap();
        f.checkpoint_tree.insert(F::from(99u64)).unwrap();
        f.checkpoint_tree.insert(mid.commitment().unwrap()).unwrap();
        let out = Checkpoint::create(f.stream.clone(), 1500, f.receiver.clone(), None).unwrap();

        let mut req = request(&mid, &out, 2900);
        req.fee = 100;
        let proof = p.prove_claim(&f.stream_tree, &f.checkpoint_tree, &req).await.unwrap();

        let expected_nullifier = mid.clone().with_leaf_index(1).nullifier().unwrap();
        assert_eq!(
            proof.proof_args.in_checkpoint_nullifier,
            field::to_fixed_hex(&expected_nullifier)
        );
        assert_eq!(proof.proof_args.public_amount, field::to_fixed_hex(&F::from(3000u64)));
        assert_eq!(proof.withdraw_data.recipient, format!("0x{}", "11".repeat(20)));
        assert_eq!(proof.withdraw_data.fee, field::to_fixed_hex(&F::from(100u64)));

        let ciphertext = field::hex_to_bytes(&proof.withdraw_data.encrypted_data).unwrap();
        let decoded = Checkpoint::decode(&ciphertext, f.stream.clone(), &f.receiver, 2).unwrap();
        assert_eq!(decoded.checkpoint_time(), 1500);

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].0, Circuit::Checkpoint);
        assert_eq!(calls[0].1["inCheckpointPathIndices"], "1");
    }

    #[tokio::test]
    async fn backend_proving_other_public_inputs_is_rejected() {
        let f = fixture();
        let zero = Checkpoint::zero(f.stream.clone());
        let out = Checkpoint::create(f.stream.clone(), 1500, f.receiver.clone(), None).unwrap();
        let err = CheckpointProver::new(Arc::new(Substituting), None)
            .prove_claim(&f.stream_tree, &f.checkpoint_tree, &request(&zero, &out, 5000))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Backend(BackendError::PublicSignals { circuit: Circuit::Checkpoint, .. })
        ));

        let err = StreamProver::new(Arc::new(Substituting), None)
            .prove_create(&f.stream)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::PublicSignals { .. })));
    }
}
