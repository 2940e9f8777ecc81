//! Proof backend boundary and verifier calldata encoding
//!
//! The prover is an external collaborator: it takes a circuit name and a
//! signal map and returns a Groth16 proof over BN254 plus the public
//! signals. This module defines that interface ([`ProofBackend`]), checks
//! what comes back (coordinates in range, points on the curve), and
//! re-encodes proofs in the shape the on-chain verifier takes.
//!
//! ## Calldata convention
//! The verifier's pairing precompile takes G2 coordinates as
//! `(c1, c0)`, while the prover emits `(c0, c1)`. Both `b` pairs are swapped
//! on the way out:
//!
//! ```text
//! b = [[b0[1], b0[0]], [b1[1], b1[0]]]
//! ```

#![forbid(unsafe_code)]

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use ark_bn254::{Fq2, G1Affine, G2Affine};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use crate::{
    config::Config,
    field::{self, FieldError},
    witness::Circuit,
    Fq, F,
};

/// Failures of the external prover or of its output.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The prover did not finish within the configured bound.
    #[error("prover timed out after {0:?}")]
    Timeout(Duration),
    /// The prover exited unsuccessfully; carries its stderr.
    #[error("prover process failed: {0}")]
    Process(String),
    #[error("prover I/O: {0}")]
    #[allow(missing_docs)]
    Io(#[from] std::io::Error),
    #[error("prover JSON: {0}")]
    #[allow(missing_docs)]
    Json(#[from] serde_json::Error),
    /// The proof or its public signals could not be parsed or are off-curve.
    #[error("malformed proof: {0}")]
    Malformed(String),
    /// The proof's public signals differ from the witness that was sent.
    #[error("{circuit} proof public signals do not match the witness: {detail}")]
    PublicSignals {
        /// Circuit that was proved.
        circuit: Circuit,
        /// First disagreement found.
        detail: String,
    },
}

// ============================================================================
// Proof types
// ============================================================================

/// Groth16 proof as the prover emits it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawProof {
    /// G1 point `(x, y)`.
    pub a: [Fq; 2],
    /// G2 point `[[x.c0, x.c1], [y.c0, y.c1]]`.
    pub b: [[Fq; 2]; 2],
    /// G1 point `(x, y)`.
    pub c: [Fq; 2],
}

/// Proof plus declared public signals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProverOutput {
    /// The proof itself.
    pub proof: RawProof,
    /// Public signals in circuit order.
    pub public_signals: Vec<F>,
}

/// Proof coordinates as fixed-width `0x`-hex, `b` pairs swapped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct SolidityProof {
    pub a: [String; 2],
    pub b: [[String; 2]; 2],
    pub c: [String; 2],
}

impl RawProof {
    /// Reject coordinates that are not points of the right groups' curves.
    pub fn validate(&self) -> Result<(), BackendError> {
        if !G1Affine::new_unchecked(self.a[0], self.a[1]).is_on_curve() {
            return Err(BackendError::Malformed("a is not on the G1 curve".into()));
        }
        if !G1Affine::new_unchecked(self.c[0], self.c[1]).is_on_curve() {
            return Err(BackendError::Malformed("c is not on the G1 curve".into()));
        }
        let b = G2Affine::new_unchecked(
            Fq2::new(self.b[0][0], self.b[0][1]),
            Fq2::new(self.b[1][0], self.b[1][1]),
        );
        if !b.is_on_curve() {
            return Err(BackendError::Malformed("b is not on the G2 curve".into()));
        }
        Ok(())
    }

    /// Verifier calldata form of the proof.
    pub fn to_solidity(&self) -> SolidityProof {
        let h = field::to_fixed_hex::<Fq>;
        SolidityProof {
            a: [h(&self.a[0]), h(&self.a[1])],
            b: [[h(&self.b[0][1]), h(&self.b[0][0])], [h(&self.b[1][1]), h(&self.b[1][0])]],
            c: [h(&self.c[0]), h(&self.c[1])],
        }
    }

    /// Parse snarkjs' `proof.json` (`pi_a`, `pi_b`, `pi_c`, projective with a
    /// trailing `1`).
    pub fn from_snarkjs(json: &[u8]) -> Result<Self, BackendError> {
        let p: SnarkjsProof = serde_json::from_slice(json)?;
        if p.pi_a.len() < 2 || p.pi_c.len() < 2 || p.pi_b.len() < 2 {
            return Err(BackendError::Malformed("truncated proof coordinates".into()));
        }
        if p.pi_b[0].len() < 2 || p.pi_b[1].len() < 2 {
            return Err(BackendError::Malformed("truncated G2 coordinate".into()));
        }
        Ok(Self {
            a: [coordinate(&p.pi_a[0])?, coordinate(&p.pi_a[1])?],
            b: [
                [coordinate(&p.pi_b[0][0])?, coordinate(&p.pi_b[0][1])?],
                [coordinate(&p.pi_b[1][0])?, coordinate(&p.pi_b[1][1])?],
            ],
            c: [coordinate(&p.pi_c[0])?, coordinate(&p.pi_c[1])?],
        })
    }
}

#[derive(Deserialize)]
struct SnarkjsProof {
    pi_a: Vec<String>,
    pi_b: Vec<Vec<String>>,
    pi_c: Vec<String>,
}

fn coordinate(s: &str) -> Result<Fq, BackendError> {
    field::parse_decimal::<Fq>(s).map_err(|e| malformed_value(s, e))
}

fn malformed_value(s: &str, e: FieldError) -> BackendError {
    BackendError::Malformed(format!("{s:?}: {e}"))
}

/// Parse snarkjs' `public.json` (array of decimal strings).
pub fn public_signals_from_snarkjs(json: &[u8]) -> Result<Vec<F>, BackendError> {
    let raw: Vec<String> = serde_json::from_slice(json)?;
    raw.iter()
        .map(|s| field::parse_decimal::<F>(s).map_err(|e| malformed_value(s, e)))
        .collect()
}

// ============================================================================
// Backend interface
// ============================================================================

/// External Groth16 prover.
#[async_trait]
pub trait ProofBackend: Send + Sync {
    /// Prove `circuit` on the named input `signals`.
    async fn prove(
        &self,
        circuit: Circuit,
        signals: &serde_json::Value,
    ) -> Result<ProverOutput, BackendError>;
}

/// Run `backend`, bounded by `timeout` when one is set, and validate what
/// it returns. Dropping the returned future cancels the backend call.
pub async fn prove_checked(
    backend: &dyn ProofBackend,
    circuit: Circuit,
    signals: &serde_json::Value,
    timeout: Option<Duration>,
) -> Result<ProverOutput, BackendError> {
    let started = Instant::now();
    info!(%circuit, "requesting proof");
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, backend.prove(circuit, signals))
            .await
            .map_err(|_| {
                warn!(%circuit, ?limit, "prover timed out");
                BackendError::Timeout(limit)
            })??,
        None => backend.prove(circuit, signals).await?,
    };
    output.proof.validate()?;
    check_public_signals(circuit, signals, &output.public_signals)?;
    info!(%circuit, elapsed_ms = started.elapsed().as_millis() as u64, "proof ready");
    Ok(output)
}

/// The backend must have proved exactly the public inputs it was given.
fn check_public_signals(
    circuit: Circuit,
    signals: &serde_json::Value,
    got: &[F],
) -> Result<(), BackendError> {
    let names = circuit.public_inputs();
    if got.len() != names.len() {
        return Err(BackendError::PublicSignals {
            circuit,
            detail: format!("expected {} values, got {}", names.len(), got.len()),
        });
    }
    for (name, got) in names.iter().zip(got) {
        let raw = signals[*name]
            .as_str()
            .ok_or_else(|| BackendError::Malformed(format!("signal map lacks {name}")))?;
        let want = field::parse_decimal::<F>(raw).map_err(|e| malformed_value(raw, e))?;
        if want != *got {
            return Err(BackendError::PublicSignals {
                circuit,
                detail: format!("{name} is {want}, proof has {got}"),
            });
        }
    }
    Ok(())
}

// ============================================================================
// snarkjs CLI backend
// ============================================================================

/// Shells out to `snarkjs groth16 fullprove` with `<dir>/<circuit>.wasm` and
/// `<dir>/<circuit>.zkey`. The child is killed if the future is dropped.
#[derive(Clone, Debug)]
pub struct SnarkjsBackend {
    bin: PathBuf,
    circuits_dir: PathBuf,
}

impl SnarkjsBackend {
    /// Backend running `bin` against the artifacts in `circuits_dir`.
    pub fn new(bin: impl Into<PathBuf>, circuits_dir: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into(), circuits_dir: circuits_dir.into() }
    }

    /// Backend from [`Config::snarkjs_bin`] and [`Config::circuits_dir`].
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.snarkjs_bin, &cfg.circuits_dir)
    }

    /// `(wasm, zkey)` paths for `circuit`.
    pub fn artifacts(&self, circuit: Circuit) -> (PathBuf, PathBuf) {
        let dir: &Path = &self.circuits_dir;
        (
            dir.join(format!("{}.wasm", circuit.name())),
            dir.join(format!("{}.zkey", circuit.name())),
        )
    }
}

#[async_trait]
impl ProofBackend for SnarkjsBackend {
    async fn prove(
        &self,
        circuit: Circuit,
        signals: &serde_json::Value,
    ) -> Result<ProverOutput, BackendError> {
        let work = tempfile::tempdir()?;
        let input = work.path().join("input.json");
        let proof_path = work.path().join("proof.json");
        let public_path = work.path().join("public.json");
        tokio::fs::write(&input, serde_json::to_vec(signals)?).await?;

        let (wasm, zkey) = self.artifacts(circuit);
        let out = Command::new(&self.bin)
            .args(["groth16", "fullprove"])
            .arg(&input)
            .arg(&wasm)
            .arg(&zkey)
            .arg(&proof_path)
            .arg(&public_path)
            .kill_on_drop(true)
            .output()
            .await?;
        if !out.status.success() {
            return Err(BackendError::Process(format!(
                "{} exited with {}: {}",
                self.bin.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        let proof = RawProof::from_snarkjs(&tokio::fs::read(&proof_path).await?)?;
        let public_signals = public_signals_from_snarkjs(&tokio::fs::read(&public_path).await?)?;
        Ok(ProverOutput { proof, public_signals })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::AffineRepr;
    use serde_json::json;

    fn generator_proof() -> RawProof {
        let g1 = G1Affine::generator();
        let g2 = G2Affine::generator();
        RawProof { a: [g1.x, g1.y], b: [[g2.x.c0, g2.x.c1], [g2.y.c0, g2.y.c1]], c: [g1.x, g1.y] }
    }

    #[test]
    fn calldata_swaps_g2_pairs() {
        let p = RawProof {
            a: [Fq::from(1u64), Fq::from(2u64)],
            b: [[Fq::from(3u64), Fq::from(4u64)], [Fq::from(5u64), Fq::from(6u64)]],
            c: [Fq::from(7u64), Fq::from(8u64)],
        };
        let s = p.to_solidity();
        assert_eq!(s.a[1], field::to_fixed_hex(&Fq::from(2u64)));
        assert_eq!(s.b[0][0], field::to_fixed_hex(&Fq::from(4u64)));
        assert_eq!(s.b[0][1], field::to_fixed_hex(&Fq::from(3u64)));
        assert_eq!(s.b[1][0], field::to_fixed_hex(&Fq::from(6u64)));
        assert_eq!(s.b[1][1], field::to_fixed_hex(&Fq::from(5u64)));
        assert_eq!(s.c[0].len(), 66);
    }

    #[test]
    fn curve_membership_is_checked() {
        assert!(generator_proof().validate().is_ok());
        let mut bad = generator_proof();
        bad.a[1] += Fq::from(1u64);
        assert!(matches!(bad.validate(), Err(BackendError::Malformed(_))));
        let mut bad = generator_proof();
        bad.b = [bad.b[0], [bad.b[1][1], bad.b[1][0]]];
        assert!(bad.validate().is_err());
    }

    #[test]
    fn parses_snarkjs_output() {
        let g = generator_proof();
        let d = |x: &Fq| field::to_decimal(x);
        let proof_json = json!({
            "pi_a": [d(&g.a[0]), d(&g.a[1]), "1"],
            "pi_b": [[d(&g.b[0][0]), d(&g.b[0][1])], [d(&g.b[1][0]), d(&g.b[1][1])], ["1", "0"]],
            "pi_c": [d(&g.c[0]), d(&g.c[1]), "1"],
            "protocol": "groth16",
            "curve": "bn128"
        });
        let parsed = RawProof::from_snarkjs(proof_json.to_string().as_bytes()).unwrap();
        assert_eq!(parsed, g);

        let public = public_signals_from_snarkjs(br#"["1500", "42"]"#).unwrap();
        assert_eq!(public, vec![F::from(1500u64), F::from(42u64)]);
        assert!(public_signals_from_snarkjs(br#"["-1"]"#).is_err());
    }

    #[test]
    fn truncated_snarkjs_proof_is_rejected() {
        let bad = br#"{"pi_a":["1"],"pi_b":[],"pi_c":[]}"#;
        assert!(matches!(RawProof::from_snarkjs(bad), Err(BackendError::Malformed(_))));
    }

    struct Slow;

    #[async_trait]
    impl ProofBackend for Slow {
        async fn prove(
            &self,
            _: Circuit,
            _: &serde_json::Value,
        ) -> Result<ProverOutput, BackendError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ProverOutput { proof: generator_proof(), public_signals: vec![] })
        }
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let err = prove_checked(&Slow, Circuit::Create, &json!({}), Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }

    struct Fixed(Vec<F>);

    #[async_trait]
    impl ProofBackend for Fixed {
        async fn prove(
            &self,
            _: Circuit,
            _: &serde_json::Value,
        ) -> Result<ProverOutput, BackendError> {
            Ok(ProverOutput { proof: generator_proof(), public_signals: self.0.clone() })
        }
    }

    #[tokio::test]
    async fn public_signals_must_match_the_witness() {
        let signals = json!({ "publicAmount": "10000", "commitment": "77", "blinding": "5" });
        let (amount, commitment) = (F::from(10_000u64), F::from(77u64));

        let ok = prove_checked(&Fixed(vec![amount, commitment]), Circuit::Create, &signals, None)
            .await
            .unwrap();
        assert_eq!(ok.public_signals, vec![amount, commitment]);

        for wrong in [vec![F::from(123_456u64)], vec![commitment, amount], vec![]] {
            let err = prove_checked(&Fixed(wrong), Circuit::Create, &signals, None)
                .await
                .unwrap_err();
            assert!(matches!(err, BackendError::PublicSignals { circuit: Circuit::Create, .. }));
        }
    }

    #[test]
    fn artifacts_follow_circuit_name() {
        let b = SnarkjsBackend::new("snarkjs", "/srv/circuits");
        let (wasm, zkey) = b.artifacts(Circuit::Checkpoint);
        assert_eq!(wasm, PathBuf::from("/srv/circuits/checkpoint.wasm"));
        assert_eq!(zkey, PathBuf::from("/srv/circuits/checkpoint.zkey"));
    }
}
