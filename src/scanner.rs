//! Note recovery by trial decryption
//!
//! A wallet has no index of its notes. It recovers them by attempting to
//! open every ciphertext the ledger published and keeping what opens and
//! parses. Failures that mean "not addressed to me" ([`Error::is_not_mine`])
//! are skipped; anything else (a viewer identity trying to decrypt, a hash
//! failure) is a caller bug and aborts the scan.
//!
//! Output order is newest first: descending chain index.

#![forbid(unsafe_code)]

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::{
    checkpoint::Checkpoint,
    error::{Error, Result},
    keys::Identity,
    ledger::NullifierOracle,
    stream::{Role, Stream},
    F,
};

/// A note with a derivable nullifier.
pub trait SpendableNote {
    /// One-time spend marker of the note.
    fn nullifier(&self) -> Result<F>;
}

impl SpendableNote for Stream {
    fn nullifier(&self) -> Result<F> {
        Stream::nullifier(self)
    }
}

impl SpendableNote for Checkpoint {
    fn nullifier(&self) -> Result<F> {
        Checkpoint::nullifier(self)
    }
}

/// Trial-decrypting scanner bound to one identity.
#[derive(Clone, Debug)]
pub struct NoteScanner<'a> {
    identity: &'a Identity,
}

impl<'a> NoteScanner<'a> {
    /// Scanner decrypting as `identity`.
    pub fn new(identity: &'a Identity) -> Self {
        Self { identity }
    }

    /// Run `decode` over every payload, keeping the ones that belong to us.
    pub fn recover<N, D>(&self, payloads: &[(Vec<u8>, u64)], mut decode: D) -> Result<Vec<N>>
    where
        D: FnMut(&[u8], &Identity, u64) -> Result<N>,
    {
        let mut ordered: Vec<&(Vec<u8>, u64)> = payloads.iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1));

        let mut notes = Vec::new();
        for (bytes, chain_index) in ordered {
            match decode(bytes, self.identity, *chain_index) {
                Ok(note) => notes.push(note),
                Err(e @ Error::Decode { .. }) => {
                    warn!(chain_index, reason = %e, "payload opened but did not decode, skipping");
                }
                Err(e) if e.is_not_mine() => {
                    debug!(chain_index, reason = %e, "skipping payload");
                }
                Err(e) => return Err(e),
            }
        }
        info!(scanned = payloads.len(), recovered = notes.len(), "trial decryption finished");
        Ok(notes)
    }

    /// Streams in which this identity plays `role`.
    pub fn recover_streams(&self, payloads: &[(Vec<u8>, u64)], role: Role) -> Result<Vec<Stream>> {
        self.recover(payloads, |bytes, me, index| Stream::decode(bytes, role, me, None, index))
    }

    /// Checkpoints of `stream` owned by this identity.
    pub fn recover_checkpoints(
        &self,
        payloads: &[(Vec<u8>, u64)],
        stream: &Arc<Stream>,
    ) -> Result<Vec<Checkpoint>> {
        self.recover(payloads, |bytes, me, index| {
            Checkpoint::decode(bytes, Arc::clone(stream), me, index)
        })
    }
}

/// Keep the notes whose nullifier the oracle reports unspent.
///
/// All queries are issued concurrently and must complete before this
/// returns. Input order is preserved.
pub async fn filter_unspent<N, O>(notes: Vec<N>, oracle: &O) -> Result<Vec<N>>
where
    N: SpendableNote,
    O: NullifierOracle + ?Sized,
{
    let nullifiers = notes.iter().map(SpendableNote::nullifier).collect::<Result<Vec<F>>>()?;
    let spent = try_join_all(nullifiers.iter().map(|n| oracle.is_spent(n))).await?;
    Ok(notes.into_iter().zip(spent).filter_map(|(note, s)| (!s).then_some(note)).collect())
}

/// Synchronous variant for callers that already hold the spent set.
pub fn filter_unspent_with<N, P>(notes: Vec<N>, mut is_spent: P) -> Result<Vec<N>>
where
    N: SpendableNote,
    P: FnMut(&F) -> bool,
{
    let mut out = Vec::with_capacity(notes.len());
    for note in notes {
        if !is_spent(&note.nullifier()?) {
            out.push(note);
        }
    }
    Ok(out)
}

/// The most advanced unspent checkpoint, or the zero checkpoint when none
/// has been claimed yet.
pub fn latest_checkpoint(stream: &Arc<Stream>, unspent: Vec<Checkpoint>) -> Checkpoint {
    unspent
        .into_iter()
        .max_by_key(Checkpoint::checkpoint_time)
        .unwrap_or_else(|| Checkpoint::zero(Arc::clone(stream)))
}
