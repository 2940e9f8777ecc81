//! Checkpoint note: how much of a stream the receiver has claimed so far
//!
//! ```text
//! commitment = Poseidon(stream.commitment, checkpointTime, blinding)
//! nullifier  = Poseidon(commitment, blinding, leafIndex)
//! ```
//!
//! The receiver advances a chain `zero -> C1 -> C2 -> ...`. Each claim spends
//! the previous checkpoint (publishing its nullifier) and inserts the next
//! one. The chain starts from the *zero checkpoint*, which is never inserted
//! anywhere: its time is the stream start and its blinding is the stream's
//! blinding, and claims prove it with an all-zero Merkle path.
//!
//! Checkpoint ciphertexts are sealed to the owner only; the owner recovers
//! the chain by scanning, with no local store.

#![forbid(unsafe_code)]

use std::sync::{Arc, OnceLock};

use rand::rngs::OsRng;

use crate::{
    codec::CheckpointPayload,
    error::{Entity, Error, Result},
    field::{self, BLINDING_BYTES},
    keys::{Identity, PublicKey},
    poseidon,
    stream::Stream,
    F,
};

/// A claim state against one stream.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    stream: Arc<Stream>,
    checkpoint_time: u64,
    owner: Identity,
    blinding: F,
    leaf_index: Option<u64>,
    commitment: OnceLock<F>,
    nullifier: OnceLock<F>,
}

impl Checkpoint {
    /// Fails with [`Error::Validation`] if `checkpoint_time` lies outside the
    /// stream window or `owner` is not the stream's receiver.
    pub fn create(
        stream: Arc<Stream>,
        checkpoint_time: u64,
        owner: Identity,
        blinding: Option<F>,
    ) -> Result<Self> {
        if owner.public_key() != stream.receiver().public_key() {
            return Err(Error::validation(
                Entity::Checkpoint,
                "owner must be the receiver of the stream",
            ));
        }
        if checkpoint_time < stream.start_time() || checkpoint_time > stream.stop_time() {
            return Err(Error::validation(
                Entity::Checkpoint,
                format!(
                    "checkpoint time {checkpoint_time} is outside the stream window [{}, {}]",
                    stream.start_time(),
                    stream.stop_time()
                ),
            ));
        }
        let blinding = match blinding {
            Some(b) => {
                field::field_to_fixed::<BLINDING_BYTES>(&b).map_err(|_| {
                    Error::validation(Entity::Checkpoint, "blinding does not fit 31 bytes")
                })?;
                b
            }
            None => field::random_blinding(&mut OsRng),
        };
        Ok(Self::assemble(stream, checkpoint_time, owner, blinding))
    }

    fn assemble(stream: Arc<Stream>, checkpoint_time: u64, owner: Identity, blinding: F) -> Self {
        Self {
            stream,
            checkpoint_time,
            owner,
            blinding,
            leaf_index: None,
            commitment: OnceLock::new(),
            nullifier: OnceLock::new(),
        }
    }

    /// Genesis checkpoint: nothing claimed yet.
    pub fn zero(stream: Arc<Stream>) -> Self {
        let owner = stream.receiver().clone();
        let (time, blinding) = (stream.start_time(), *stream.blinding());
        Self::assemble(stream, time, owner, blinding)
    }

    /// Whether this is the stream's zero checkpoint (start time, stream blinding).
    pub fn is_zero(&self) -> bool {
        self.checkpoint_time == self.stream.start_time() && self.blinding == *self.stream.blinding()
    }

    /// Same checkpoint, positioned at `leaf_index` in the checkpoint tree.
    pub fn with_leaf_index(mut self, leaf_index: u64) -> Self {
        if self.leaf_index != Some(leaf_index) {
            self.leaf_index = Some(leaf_index);
            self.nullifier = OnceLock::new();
        }
        self
    }

    /// Stream this checkpoint claims against.
    #[inline]
    pub fn stream(&self) -> &Arc<Stream> {
        &self.stream
    }

    /// Time up to which value has been claimed.
    #[inline]
    pub fn checkpoint_time(&self) -> u64 {
        self.checkpoint_time
    }

    /// The stream's receiver.
    #[inline]
    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    /// Commitment blinding.
    #[inline]
    pub fn blinding(&self) -> &F {
        &self.blinding
    }

    /// Position in the checkpoint tree, once inserted.
    #[inline]
    pub fn leaf_index(&self) -> Option<u64> {
        self.leaf_index
    }

    /// `H(stream commitment, checkpoint time, blinding)`, cached.
    pub fn commitment(&self) -> Result<F> {
        if let Some(c) = self.commitment.get() {
            return Ok(*c);
        }
        let c = poseidon::hash(&[
            self.stream.commitment()?,
            F::from(self.checkpoint_time),
            self.blinding,
        ])?;
        let _ = self.commitment.set(c);
        Ok(c)
    }

    /// Fails with [`Error::MissingDependency`] until a leaf index is attached.
    /// The zero checkpoint only gets one during claim assembly.
    pub fn nullifier(&self) -> Result<F> {
        if let Some(n) = self.nullifier.get() {
            return Ok(*n);
        }
        let index =
            self.leaf_index.ok_or_else(|| Error::missing(Entity::Checkpoint, "leaf index"))?;
        let n = poseidon::hash(&[self.commitment()?, self.blinding, F::from(index)])?;
        let _ = self.nullifier.set(n);
        Ok(n)
    }

    /// Value accrued between `since` and this checkpoint.
    pub fn claimable_since(&self, since: &Checkpoint) -> Result<u128> {
        if since.stream.commitment()? != self.stream.commitment()? {
            return Err(Error::validation(Entity::Claim, "checkpoints belong to different streams"));
        }
        let elapsed = self.checkpoint_time.checked_sub(since.checkpoint_time).ok_or_else(|| {
            Error::validation(
                Entity::Claim,
                format!(
                    "checkpoint time {} precedes input checkpoint time {}",
                    self.checkpoint_time, since.checkpoint_time
                ),
            )
        })?;
        // Bounded by stream.amount(), which is checked at construction.
        Ok(self.stream.rate() * u128::from(elapsed))
    }

    /// Seal the checkpoint to its owner.
    pub fn encrypt(&self) -> Result<Vec<u8>> {
        let payload = CheckpointPayload {
            stream_commitment: self.stream.commitment()?,
            sender_public_key: self.stream.sender().public_key().to_field(),
            checkpoint_time: self.checkpoint_time,
            blinding: self.blinding,
        };
        let plaintext =
            payload.encode().map_err(|e| Error::validation(Entity::Checkpoint, e.to_string()))?;
        self.owner.encrypt(&plaintext)
    }

    /// Open a checkpoint ciphertext and bind it to `stream`.
    ///
    /// A payload naming a different stream commitment or sender key fails
    /// with [`Error::Validation`].
    pub fn decode(
        bytes: &[u8],
        stream: Arc<Stream>,
        owner: &Identity,
        leaf_index: u64,
    ) -> Result<Self> {
        let plaintext = owner.decrypt(bytes)?;
        let p = CheckpointPayload::decode(&plaintext)
            .map_err(|e| Error::decode(Entity::Checkpoint, e))?;
        if p.stream_commitment != stream.commitment()? {
            return Err(Error::validation(Entity::Checkpoint, "stream commitment does not match"));
        }
        if PublicKey::new(p.sender_public_key) != stream.sender().public_key() {
            return Err(Error::validation(Entity::Checkpoint, "stream sender does not match"));
        }
        Ok(Self::create(stream, p.checkpoint_time, owner.clone(), Some(p.blinding))?
            .with_leaf_index(leaf_index))
    }
}

impl PartialEq for Checkpoint {
    fn eq(&self, other: &Self) -> bool {
        *self.stream == *other.stream
            && self.checkpoint_time == other.checkpoint_time
            && self.owner == other.owner
            && self.blinding == other.blinding
            && self.leaf_index == other.leaf_index
    }
}

impl Eq for Checkpoint {}
