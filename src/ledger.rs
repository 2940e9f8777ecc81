//! Consumed ledger interface
//!
//! The ledger itself (commitment storage, nullifier set, custody) lives
//! on-chain. This module only defines what the core reads from it:
//! ordered leaf-insertion events per tree, and a spent-nullifier query.

#![forbid(unsafe_code)]

use std::{collections::HashSet, fmt, str::FromStr, sync::RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    constants::{zero_leaf_checkpoint, zero_leaf_stream},
    error::{Entity, Error, Result},
    field,
    merkle::CommitmentTree,
    stream::Role,
    F,
};

/// The two commitment trees the ledger maintains.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TreeKind {
    /// Stream commitments.
    Stream,
    /// Checkpoint commitments.
    Checkpoint,
}

impl TreeKind {
    /// Lowercase name, as used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            TreeKind::Stream => "stream",
            TreeKind::Checkpoint => "checkpoint",
        }
    }

    /// Empty-leaf constant of this tree.
    pub fn zero_leaf(self) -> F {
        match self {
            TreeKind::Stream => zero_leaf_stream(),
            TreeKind::Checkpoint => zero_leaf_checkpoint(),
        }
    }
}

impl fmt::Display for TreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TreeKind {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s {
            "stream" => Ok(TreeKind::Stream),
            "checkpoint" => Ok(TreeKind::Checkpoint),
            other => Err(format!("unknown tree kind {other:?} (expected stream|checkpoint)")),
        }
    }
}

// ============================================================================
// Leaf events
// ============================================================================

/// One leaf insertion as emitted by the ledger contract.
///
/// Stream insertions carry a ciphertext for each party. Checkpoint
/// insertions carry only the receiver-side one, sealed to the owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafEvent {
    /// `0x`-hex commitment.
    pub commitment: String,
    /// Index the ledger assigned.
    pub leaf_index: u64,
    /// Hex ciphertext sealed to the stream's sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_data_sender: Option<String>,
    /// Hex ciphertext sealed to the receiver (the owner, for checkpoints).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_data_receiver: Option<String>,
}

impl LeafEvent {
    /// Range-checked commitment.
    pub fn commitment(&self) -> Result<F> {
        field::from_hex(&self.commitment).map_err(|e| {
            Error::validation(
                Entity::LedgerEvent,
                format!("commitment at index {}: {e}", self.leaf_index),
            )
        })
    }

    /// Ciphertext addressed to `role`, if the event carries one.
    pub fn ciphertext(&self, role: Role) -> Result<Option<Vec<u8>>> {
        let hex = match role {
            Role::Sender => self.encrypted_data_sender.as_deref(),
            Role::Receiver => self.encrypted_data_receiver.as_deref(),
        };
        hex.map(field::hex_to_bytes).transpose().map_err(|e| Error::decode(Entity::LedgerEvent, e))
    }
}

/// Parse a JSON array of leaf events.
pub fn parse_events(json: &str) -> Result<Vec<LeafEvent>> {
    serde_json::from_str(json).map_err(|e| Error::decode(Entity::LedgerEvent, e))
}

/// Rebuild a tree from an unordered event dump.
///
/// Events are sorted by assigned index. A duplicate or a gap means the log
/// read was incomplete, and replaying it would shift every later leaf, so
/// both are rejected.
pub fn replay_tree(kind: TreeKind, levels: usize, events: &[LeafEvent]) -> Result<CommitmentTree> {
    let mut ordered: Vec<&LeafEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.leaf_index);

    let mut leaves = Vec::with_capacity(ordered.len());
    for (expected, event) in ordered.iter().enumerate() {
        if event.leaf_index != expected as u64 {
            return Err(Error::validation(
                Entity::LedgerEvent,
                format!(
                    "{kind} tree events are not contiguous: expected index {expected}, found {}",
                    event.leaf_index
                ),
            ));
        }
        leaves.push(event.commitment()?);
    }

    let tree = CommitmentTree::from_leaves(&leaves, levels, kind.zero_leaf())?;
    info!(
        tree = %kind,
        leaves = tree.len(),
        levels,
        root = %field::to_fixed_hex(&tree.root()),
        "replayed commitment tree"
    );
    Ok(tree)
}

/// `(ciphertext, chain index)` pairs addressed to `role`. Events without
/// data or with undecodable hex are skipped.
pub fn scan_payloads(events: &[LeafEvent], role: Role) -> Vec<(Vec<u8>, u64)> {
    events
        .iter()
        .filter_map(|e| match e.ciphertext(role) {
            Ok(Some(bytes)) => Some((bytes, e.leaf_index)),
            Ok(None) => None,
            Err(err) => {
                warn!(leaf_index = e.leaf_index, error = %err, "skipping ledger event");
                None
            }
        })
        .collect()
}

// ============================================================================
// Nullifier oracle
// ============================================================================

/// Spent-status lookup failure.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The query could not be answered.
    #[error("nullifier query failed: {0}")]
    Query(String),
}

/// `isNullifierUsed` on the ledger.
#[async_trait]
pub trait NullifierOracle: Send + Sync {
    /// Whether `nullifier` has been spent.
    async fn is_spent(&self, nullifier: &F) -> Result<bool, OracleError>;
}

/// Locally known spent nullifiers.
#[derive(Debug, Default)]
pub struct SpentSet {
    inner: RwLock<HashSet<F>>,
}

impl SpentSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `nullifier` as spent.
    pub fn mark_spent(&self, nullifier: F) -> Result<(), OracleError> {
        self.inner
            .write()
            .map_err(|_| OracleError::Query("spent set lock poisoned".into()))?
            .insert(nullifier);
        Ok(())
    }

    /// Whether `nullifier` was recorded.
    pub fn contains(&self, nullifier: &F) -> Result<bool, OracleError> {
        Ok(self
            .inner
            .read()
            .map_err(|_| OracleError::Query("spent set lock poisoned".into()))?
            .contains(nullifier))
    }
}

impl FromIterator<F> for SpentSet {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        Self { inner: RwLock::new(iter.into_iter().collect()) }
    }
}

#[async_trait]
impl NullifierOracle for SpentSet {
    async fn is_spent(&self, nullifier: &F) -> Result<bool, OracleError> {
        self.contains(nullifier)
    }
}
