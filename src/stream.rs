//! Stream note: a rate, a time window, two parties, one blinding factor
//!
//! A [`Stream`] is a pure value. Its identity is its commitment
//!
//! ```text
//! commitment = Poseidon(rate, startTime, stopTime, senderPub, receiverPub, blinding)
//! nullifier  = Poseidon(commitment, blinding, leafIndex)
//! ```
//!
//! and both are computed lazily and cached. The leaf index is the only
//! attribute that is learned after construction (once the ledger has
//! inserted the commitment); attaching it goes through
//! [`Stream::with_leaf_index`], which returns a new value and never touches
//! the commitment.
//!
//! The same 136-byte plaintext is sealed once to the sender and once to the
//! receiver, so either side can recover the full note by scanning the ledger.

#![forbid(unsafe_code)]

use std::sync::OnceLock;

use rand::rngs::OsRng;

use crate::{
    codec::{StreamPayload, MAX_TIME},
    error::{Entity, Error, Result},
    field::{self, BLINDING_BYTES},
    keys::{Identity, PublicKey},
    poseidon, F,
};

/// Which party is opening a stream ciphertext.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    /// Funds the stream.
    Sender,
    /// Claims from the stream.
    Receiver,
}

/// An immutable payment stream.
#[derive(Clone, Debug)]
pub struct Stream {
    rate: u128,
    start_time: u64,
    stop_time: u64,
    blinding: F,
    sender: Identity,
    receiver: Identity,
    leaf_index: Option<u64>,
    commitment: OnceLock<F>,
    nullifier: OnceLock<F>,
}

impl Stream {
    /// Build a stream. A fresh 31-byte blinding is drawn when none is given.
    ///
    /// Fails with [`Error::Validation`] if `stop_time <= start_time`, if a time
    /// does not fit the 5-byte payload field, if the supplied blinding does
    /// not fit 31 bytes, or if `rate × duration` overflows.
    pub fn create(
        rate: u128,
        start_time: u64,
        stop_time: u64,
        sender: Identity,
        receiver: Identity,
        blinding: Option<F>,
    ) -> Result<Self> {
        if stop_time <= start_time {
            return Err(Error::validation(
                Entity::Stream,
                format!("stop time {stop_time} must exceed start time {start_time}"),
            ));
        }
        if stop_time > MAX_TIME {
            return Err(Error::validation(
                Entity::Stream,
                format!("stop time {stop_time} exceeds the 40-bit timestamp range"),
            ));
        }
        if rate.checked_mul(u128::from(stop_time - start_time)).is_none() {
            return Err(Error::validation(Entity::Stream, "rate × duration overflows"));
        }
        let blinding = match blinding {
            Some(b) => {
                field::field_to_fixed::<BLINDING_BYTES>(&b).map_err(|_| {
                    Error::validation(Entity::Stream, "blinding does not fit 31 bytes")
                })?;
                b
            }
            None => field::random_blinding(&mut OsRng),
        };

        Ok(Self {
            rate,
            start_time,
            stop_time,
            blinding,
            sender,
            receiver,
            leaf_index: None,
            commitment: OnceLock::new(),
            nullifier: OnceLock::new(),
        })
    }

    /// Same stream, positioned at `leaf_index` in the stream tree.
    pub fn with_leaf_index(mut self, leaf_index: u64) -> Self {
        if self.leaf_index != Some(leaf_index) {
            self.leaf_index = Some(leaf_index);
            self.nullifier = OnceLock::new();
        }
        self
    }

    /// Units per second.
    #[inline]
    pub fn rate(&self) -> u128 {
        self.rate
    }

    /// Window start.
    #[inline]
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Window end.
    #[inline]
    pub fn stop_time(&self) -> u64 {
        self.stop_time
    }

    /// Commitment blinding.
    #[inline]
    pub fn blinding(&self) -> &F {
        &self.blinding
    }

    /// Funding party.
    #[inline]
    pub fn sender(&self) -> &Identity {
        &self.sender
    }

    /// Claiming party.
    #[inline]
    pub fn receiver(&self) -> &Identity {
        &self.receiver
    }

    /// Position in the stream tree, once inserted.
    #[inline]
    pub fn leaf_index(&self) -> Option<u64> {
        self.leaf_index
    }

    /// `stop_time - start_time`.
    pub fn duration(&self) -> u64 {
        self.stop_time - self.start_time
    }

    /// Total value streamed over the window.
    pub fn amount(&self) -> u128 {
        // Checked at construction.
        self.rate * u128::from(self.duration())
    }

    /// `H(rate, start, stop, sender key, receiver key, blinding)`, cached.
    pub fn commitment(&self) -> Result<F> {
        if let Some(c) = self.commitment.get() {
            return Ok(*c);
        }
        let c = poseidon::hash(&[
            F::from(self.rate),
            F::from(self.start_time),
            F::from(self.stop_time),
            self.sender.public_key().to_field(),
            self.receiver.public_key().to_field(),
            self.blinding,
        ])?;
        let _ = self.commitment.set(c);
        Ok(c)
    }

    /// Fails with [`Error::MissingDependency`] until a leaf index is attached.
    pub fn nullifier(&self) -> Result<F> {
        if let Some(n) = self.nullifier.get() {
            return Ok(*n);
        }
        let index = self.leaf_index.ok_or_else(|| Error::missing(Entity::Stream, "leaf index"))?;
        let n = poseidon::hash(&[self.commitment()?, self.blinding, F::from(index)])?;
        let _ = self.nullifier.set(n);
        Ok(n)
    }

    fn payload(&self) -> StreamPayload {
        StreamPayload {
            rate: self.rate,
            start_time: self.start_time,
            stop_time: self.stop_time,
            blinding: self.blinding,
            sender_public_key: self.sender.public_key().to_field(),
            receiver_public_key: self.receiver.public_key().to_field(),
        }
    }

    fn encrypt_to(&self, to: &Identity) -> Result<Vec<u8>> {
        let plaintext = self
            .payload()
            .encode()
            .map_err(|e| Error::validation(Entity::Stream, e.to_string()))?;
        to.encrypt(&plaintext)
    }

    /// Ciphertext the sender recovers the stream from.
    pub fn encrypt_for_sender(&self) -> Result<Vec<u8>> {
        self.encrypt_to(&self.sender)
    }

    /// Ciphertext the receiver recovers the stream from.
    pub fn encrypt_for_receiver(&self) -> Result<Vec<u8>> {
        self.encrypt_to(&self.receiver)
    }

    /// Open a sender-side ciphertext with the sender's keys.
    pub fn decode_as_sender(
        bytes: &[u8],
        sender: &Identity,
        known_receiver: Option<&Identity>,
        leaf_index: u64,
    ) -> Result<Self> {
        Self::decode(bytes, Role::Sender, sender, known_receiver, leaf_index)
    }

    /// Open a receiver-side ciphertext with the receiver's keys.
    pub fn decode_as_receiver(
        bytes: &[u8],
        receiver: &Identity,
        known_sender: Option<&Identity>,
        leaf_index: u64,
    ) -> Result<Self> {
        Self::decode(bytes, Role::Receiver, receiver, known_sender, leaf_index)
    }

    /// Decrypt as `role` using `me`, then rebuild the note.
    ///
    /// The decoded key for `me`'s role must equal `me`'s key. A supplied
    /// counterpart must match the decoded counterpart key. Without one, the
    /// counterpart becomes a [`Identity::PublicOnly`] built from the payload.
    pub fn decode(
        bytes: &[u8],
        role: Role,
        me: &Identity,
        counterpart: Option<&Identity>,
        leaf_index: u64,
    ) -> Result<Self> {
        let plaintext = me.decrypt(bytes)?;
        let p = StreamPayload::decode(&plaintext).map_err(|e| Error::decode(Entity::Stream, e))?;

        let (mine, theirs) = match role {
            Role::Sender => (p.sender_public_key, p.receiver_public_key),
            Role::Receiver => (p.receiver_public_key, p.sender_public_key),
        };
        if PublicKey::new(mine) != me.public_key() {
            return Err(Error::validation(
                Entity::Stream,
                format!("decoded {role:?} key does not match the decrypting identity"),
            ));
        }
        let counterpart = match counterpart {
            Some(c) if c.public_key() == PublicKey::new(theirs) => c.clone(),
            Some(_) => {
                return Err(Error::validation(
                    Entity::Stream,
                    "decoded counterpart key does not match the supplied identity",
                ))
            }
            None => Identity::from_public_key(PublicKey::new(theirs)),
        };
        let (sender, receiver) = match role {
            Role::Sender => (me.clone(), counterpart),
            Role::Receiver => (counterpart, me.clone()),
        };

        Ok(Self::create(p.rate, p.start_time, p.stop_time, sender, receiver, Some(p.blinding))?
            .with_leaf_index(leaf_index))
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.rate == other.rate
            && self.start_time == other.start_time
            && self.stop_time == other.stop_time
            && self.blinding == other.blinding
            && self.sender == other.sender
            && self.receiver == other.receiver
            && self.leaf_index == other.leaf_index
    }
}

impl Eq for Stream {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::FullKeys;

    fn party() -> Identity {
        Identity::Full(FullKeys::random(&mut OsRng).unwrap())
    }

    fn fixed_party(secret: u64) -> Identity {
        Identity::create(Some(F::from(secret))).unwrap()
    }

    fn sample(a: &Identity, b: &Identity) -> Stream {
        Stream::create(10_000_000_000_000, 1000, 2000, a.clone(), b.clone(), None).unwrap()
    }

    #[test]
    fn amount_is_rate_times_duration() {
        let s = sample(&party(), &party());
        assert_eq!(s.duration(), 1000);
        assert_eq!(s.amount(), 10_000_000_000_000_000);
    }

    #[test]
    fn rejects_bad_windows() {
        let (a, b) = (party(), party());
        for (start, stop) in [(1000, 1000), (2000, 1000)] {
            let err = Stream::create(1, start, stop, a.clone(), b.clone(), None).unwrap_err();
            assert!(matches!(err, Error::Validation { entity: Entity::Stream, .. }));
        }
        assert!(Stream::create(1, 0, MAX_TIME + 1, a.clone(), b.clone(), None).is_err());
        assert!(Stream::create(u128::MAX, 0, 2, a, b, None).is_err());
    }

    #[test]
    fn commitment_and_nullifier_vectors() {
        let s = Stream::create(
            10_000_000_000_000,
            1000,
            2000,
            fixed_party(1),
            fixed_party(2),
            Some(F::from(12345u64)),
        )
        .unwrap()
        .with_leaf_index(5);
        let dec = |v: &str| field::parse_decimal::<F>(v).unwrap();
        assert_eq!(
            s.commitment().unwrap(),
            dec("5344623804608171356718565762770136694870286591436241849979015675950791422181")
        );
        assert_eq!(
            s.nullifier().unwrap(),
            dec("4670488019472233002862038678544389052322371642684002595598433374433300656701")
        );

        // Raw arity-6 layout: rate, start, stop, sender key, receiver key, blinding.
        let raw = Stream::create(
            1,
            2,
            3,
            Identity::from_public_key(PublicKey::new(F::from(4u64))),
            Identity::from_public_key(PublicKey::new(F::from(5u64))),
            Some(F::from(6u64)),
        )
        .unwrap();
        assert_eq!(
            raw.commitment().unwrap(),
            dec("20400040500897583745843009878988256314335038853985262692600694741116813247201")
        );
    }

    #[test]
    fn commitment_is_deterministic_and_field_sensitive() {
        let (a, b) = (fixed_party(1), fixed_party(2));
        let blinding = Some(F::from(777u64));
        let base = Stream::create(5, 10, 20, a.clone(), b.clone(), blinding).unwrap();
        let same = Stream::create(5, 10, 20, a.clone(), b.clone(), blinding).unwrap();
        assert_eq!(base.commitment().unwrap(), same.commitment().unwrap());

        let expected = poseidon::hash(&[
            F::from(5u64),
            F::from(10u64),
            F::from(20u64),
            a.public_key().to_field(),
            b.public_key().to_field(),
            F::from(777u64),
        ])
        .unwrap();
        assert_eq!(base.commitment().unwrap(), expected);

        let variants = [
            Stream::create(6, 10, 20, a.clone(), b.clone(), blinding).unwrap(),
            Stream::create(5, 11, 20, a.clone(), b.clone(), blinding).unwrap(),
            Stream::create(5, 10, 21, a.clone(), b.clone(), blinding).unwrap(),
            Stream::create(5, 10, 20, fixed_party(3), b.clone(), blinding).unwrap(),
            Stream::create(5, 10, 20, a.clone(), fixed_party(3), blinding).unwrap(),
            Stream::create(5, 10, 20, a.clone(), b.clone(), Some(F::from(778u64))).unwrap(),
        ];
        for v in &variants {
            assert_ne!(v.commitment().unwrap(), base.commitment().unwrap());
        }
    }

    #[test]
    fn nullifier_needs_leaf_index() {
        let s = sample(&party(), &party());
        assert!(matches!(
            s.nullifier(),
            Err(Error::MissingDependency { entity: Entity::Stream, what: "leaf index" })
        ));
        let c = s.commitment().unwrap();
        let placed = s.with_leaf_index(3);
        let expected = poseidon::hash(&[c, *placed.blinding(), F::from(3u64)]).unwrap();
        assert_eq!(placed.nullifier().unwrap(), expected);
        // re-positioning invalidates the cached nullifier but not the commitment
        let moved = placed.with_leaf_index(4);
        assert_ne!(moved.nullifier().unwrap(), expected);
        assert_eq!(moved.commitment().unwrap(), c);
    }

    #[test]
    fn receiver_round_trip_without_known_sender() {
        let (a, b) = (party(), party());
        let s = sample(&a, &b);
        let ct = s.encrypt_for_receiver().unwrap();
        let got = Stream::decode_as_receiver(&ct, &b, None, 5).unwrap();

        assert_eq!(got.stop_time(), 2000);
        assert_eq!(got.leaf_index(), Some(5));
        assert!(matches!(got.sender(), Identity::PublicOnly(_)));
        assert_eq!(got.commitment().unwrap(), s.commitment().unwrap());
        assert_eq!(got, s.with_leaf_index(5));
    }

    #[test]
    fn sender_round_trip_with_known_receiver() {
        let (a, b) = (party(), party());
        let s = sample(&a, &b);
        let ct = s.encrypt_for_sender().unwrap();
        let got = Stream::decode_as_sender(&ct, &a, Some(&b), 0).unwrap();
        assert!(matches!(got.receiver(), Identity::Full(_)));
        assert_eq!(got.commitment().unwrap(), s.commitment().unwrap());

        let stranger = party();
        let err = Stream::decode_as_sender(&ct, &a, Some(&stranger), 0).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn wrong_party_cannot_decode() {
        let (a, b) = (party(), party());
        let s = sample(&a, &b);
        let for_b = s.encrypt_for_receiver().unwrap();
        assert!(matches!(Stream::decode_as_receiver(&for_b, &a, None, 0), Err(Error::Decryption)));

        // A sender ciphertext opened in the receiver role fails the key check.
        let for_a = s.encrypt_for_sender().unwrap();
        let err = Stream::decode_as_receiver(&for_a, &a, None, 0).unwrap_err();
        assert!(err.is_not_mine());
    }

    #[test]
    fn viewer_can_be_encrypted_to() {
        let b = party();
        let viewer = Identity::from_serialized_address(&b.address().unwrap()).unwrap();
        let s = sample(&party(), &viewer);
        let ct = s.encrypt_for_receiver().unwrap();
        assert!(Stream::decode_as_receiver(&ct, &b, None, 1).is_ok());
    }
}
