//! Fixed-width payload layouts for encrypted notes
//!
//! Each payload is a concatenation of big-endian, left zero-padded fields.
//! Field widths are `const`s and the total width is asserted at compile time,
//! so a width edit that would shift every later field fails to build instead
//! of failing to decode somewhere else.
//!
//! ```text
//! stream      rate(31) start(5) stop(5) blinding(31) senderPub(32) receiverPub(32)   = 136
//! checkpoint  streamCommitment(32) senderPub(32) checkpointTime(5) blinding(31)       = 100
//! ```

#![forbid(unsafe_code)]

use crate::{
    field::{self, FieldError, BLINDING_BYTES, FIELD_BYTES},
    F,
};

/// Wire width of a stream rate. Only rates below `2^128` decode.
pub const RATE_BYTES: usize = 31;
/// Wire width of a timestamp.
pub const TIME_BYTES: usize = 5;
/// Wire width of a hash-domain public key.
pub const PUBKEY_BYTES: usize = FIELD_BYTES;
/// Wire width of a note commitment.
pub const COMMITMENT_BYTES: usize = FIELD_BYTES;

/// Largest timestamp a 5-byte field can carry.
pub const MAX_TIME: u64 = (1u64 << (8 * TIME_BYTES)) - 1;

/// Stream plaintext width.
pub const STREAM_PAYLOAD_BYTES: usize = 136;
/// Checkpoint plaintext width.
pub const CHECKPOINT_PAYLOAD_BYTES: usize = 100;

const _: () = assert!(
    RATE_BYTES + 2 * TIME_BYTES + BLINDING_BYTES + 2 * PUBKEY_BYTES == STREAM_PAYLOAD_BYTES
);
const _: () = assert!(
    COMMITMENT_BYTES + PUBKEY_BYTES + TIME_BYTES + BLINDING_BYTES == CHECKPOINT_PAYLOAD_BYTES
);

/// Payload encode/decode failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Plaintext has the wrong total width.
    #[error("payload is {got} bytes, expected {expected}")]
    Length {
        /// Layout width.
        expected: usize,
        /// Actual width.
        got: usize,
    },
    /// One field does not fit its slot or its type.
    #[error("field `{field}`: {source}")]
    Field {
        /// Wire name of the field.
        field: &'static str,
        /// Underlying range or width failure.
        source: FieldError,
    },
}

fn at(field: &'static str) -> impl FnOnce(FieldError) -> CodecError {
    move |source| CodecError::Field { field, source }
}

// ============================================================================
// Cursor helpers
// ============================================================================

struct Writer<const N: usize> {
    buf: [u8; N],
    pos: usize,
}

impl<const N: usize> Writer<N> {
    fn new() -> Self {
        Self { buf: [0u8; N], pos: 0 }
    }

    fn put<const W: usize>(&mut self, bytes: [u8; W]) -> &mut Self {
        self.buf[self.pos..self.pos + W].copy_from_slice(&bytes);
        self.pos += W;
        self
    }

    fn finish(&self) -> [u8; N] {
        debug_assert_eq!(self.pos, N);
        self.buf
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn exact(bytes: &'a [u8], expected: usize) -> Result<Self, CodecError> {
        if bytes.len() != expected {
            return Err(CodecError::Length { expected, got: bytes.len() });
        }
        Ok(Self { bytes })
    }

    fn take<const W: usize>(&mut self) -> &'a [u8] {
        let (head, tail) = self.bytes.split_at(W);
        self.bytes = tail;
        head
    }
}

// ============================================================================
// Stream payload
// ============================================================================

/// Plaintext carried by both stream ciphertexts.
///
/// The rate slot is 31 bytes wide but held as `u128`. A payload whose rate
/// is `2^128` or more fails [`StreamPayload::decode`] with
/// [`CodecError::Field`] on `"rate"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct StreamPayload {
    pub rate: u128,
    pub start_time: u64,
    pub stop_time: u64,
    pub blinding: F,
    pub sender_public_key: F,
    pub receiver_public_key: F,
}

impl StreamPayload {
    /// Serialize into the fixed stream layout.
    pub fn encode(&self) -> Result<[u8; STREAM_PAYLOAD_BYTES], CodecError> {
        let mut w = Writer::<STREAM_PAYLOAD_BYTES>::new();
        w.put(field::u128_to_fixed::<RATE_BYTES>(self.rate).map_err(at("rate"))?)
            .put(field::u128_to_fixed::<TIME_BYTES>(self.start_time.into()).map_err(at("startTime"))?)
            .put(field::u128_to_fixed::<TIME_BYTES>(self.stop_time.into()).map_err(at("stopTime"))?)
            .put(field::field_to_fixed::<BLINDING_BYTES>(&self.blinding).map_err(at("blinding"))?)
            .put(field::to_be_bytes(&self.sender_public_key))
            .put(field::to_be_bytes(&self.receiver_public_key));
        Ok(w.finish())
    }

    /// Parse the fixed stream layout. Key and blinding slots are range-checked.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::exact(bytes, STREAM_PAYLOAD_BYTES)?;
        Ok(Self {
            rate: field::u128_from_be(r.take::<RATE_BYTES>()).map_err(at("rate"))?,
            start_time: field::u64_from_be(r.take::<TIME_BYTES>()).map_err(at("startTime"))?,
            stop_time: field::u64_from_be(r.take::<TIME_BYTES>()).map_err(at("stopTime"))?,
            blinding: field::from_be_bytes_checked(r.take::<BLINDING_BYTES>())
                .map_err(at("blinding"))?,
            sender_public_key: field::from_be_bytes_checked(r.take::<PUBKEY_BYTES>())
                .map_err(at("senderPublicKey"))?,
            receiver_public_key: field::from_be_bytes_checked(r.take::<PUBKEY_BYTES>())
                .map_err(at("receiverPublicKey"))?,
        })
    }
}

// ============================================================================
// Checkpoint payload
// ============================================================================

/// Plaintext of a self-addressed checkpoint ciphertext.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct CheckpointPayload {
    pub stream_commitment: F,
    pub sender_public_key: F,
    pub checkpoint_time: u64,
    pub blinding: F,
}

impl CheckpointPayload {
    /// Serialize into the fixed checkpoint layout.
    pub fn encode(&self) -> Result<[u8; CHECKPOINT_PAYLOAD_BYTES], CodecError> {
        let mut w = Writer::<CHECKPOINT_PAYLOAD_BYTES>::new();
        w.put(field::to_be_bytes(&self.stream_commitment))
            .put(field::to_be_bytes(&self.sender_public_key))
            .put(
                field::u128_to_fixed::<TIME_BYTES>(self.checkpoint_time.into())
                    .map_err(at("checkpointTime"))?,
            )
            .put(field::field_to_fixed::<BLINDING_BYTES>(&self.blinding).map_err(at("blinding"))?);
        Ok(w.finish())
    }

    /// Parse the fixed checkpoint layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::exact(bytes, CHECKPOINT_PAYLOAD_BYTES)?;
        Ok(Self {
            stream_commitment: field::from_be_bytes_checked(r.take::<COMMITMENT_BYTES>())
                .map_err(at("streamCommitment"))?,
            sender_public_key: field::from_be_bytes_checked(r.take::<PUBKEY_BYTES>())
                .map_err(at("senderPublicKey"))?,
            checkpoint_time: field::u64_from_be(r.take::<TIME_BYTES>())
                .map_err(at("checkpointTime"))?,
            blinding: field::from_be_bytes_checked(r.take::<BLINDING_BYTES>())
                .map_err(at("blinding"))?,
        })
    }
}
