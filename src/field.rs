//! Field plumbing: fixed-width big-endian codecs and range-checked parsing
//!
//! Everything that crosses a byte boundary (ciphertext plaintexts, ledger
//! events, prover output, calldata) goes through this module.
//!
//! ## Invariants
//! - **No silent reduction.** Bytes or strings that encode an integer
//!   `≥ modulus` are rejected with [`FieldError::OutOfRange`]. The only
//!   `*_mod_order` call sites are the ones whose input is provably below the
//!   modulus (31-byte blinding) or where reduction is the definition
//!   (keccak-derived constants).
//! - **Fixed widths are checked.** Encoding into `W` bytes fails with
//!   [`FieldError::Overflow`] instead of truncating.
//! - **Big-endian, left zero-padded**, matching the on-chain `toFixedHex`
//!   convention.

#![forbid(unsafe_code)]

use ark_ff::{BigInt, BigInteger, PrimeField, UniformRand};
use rand::{CryptoRng, RngCore};

use crate::F;

/// Width of a canonical field element encoding.
pub const FIELD_BYTES: usize = 32;

/// Errors surfaced by byte/string ↔ field conversions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// Too many significant bytes for the target width.
    #[error("value does not fit in {width} bytes")]
    Overflow {
        /// Target width in bytes.
        width: usize,
    },
    /// Not a canonical field element.
    #[error("value is not below the field modulus")]
    OutOfRange,
    /// Not hex.
    #[error("invalid hex string: {0}")]
    Hex(String),
    /// Not a decimal integer.
    #[error("invalid decimal string {0:?}")]
    Decimal(String),
    /// Nothing left after the prefix.
    #[error("no digits in {0:?}")]
    Empty(String),
}

// ============================================================================
// Field ↔ bytes
// ============================================================================

/// Canonical 32-byte big-endian encoding of a BN254 element (either field).
pub fn to_be_bytes<P: PrimeField<BigInt = BigInt<4>>>(f: &P) -> [u8; FIELD_BYTES] {
    let mut out = [0u8; FIELD_BYTES];
    // Four 64-bit limbs serialize to exactly 32 bytes.
    out.copy_from_slice(&f.into_bigint().to_bytes_be());
    out
}

/// Parse big-endian bytes into a field element, rejecting values `≥ modulus`.
///
/// Leading zero bytes are accepted, so a 31-byte and a 32-byte encoding of the
/// same integer parse identically.
pub fn from_be_bytes_checked<P: PrimeField>(bytes: &[u8]) -> Result<P, FieldError> {
    let value = P::from_be_bytes_mod_order(bytes);
    let canonical = value.into_bigint().to_bytes_be();
    if trim_leading_zeros(&canonical) != trim_leading_zeros(bytes) {
        return Err(FieldError::OutOfRange);
    }
    Ok(value)
}

/// Right-align `be` into exactly `W` bytes. Fails if the significant bytes
/// do not fit.
pub fn fit<const W: usize>(be: &[u8]) -> Result<[u8; W], FieldError> {
    let significant = trim_leading_zeros(be);
    if significant.len() > W {
        return Err(FieldError::Overflow { width: W });
    }
    let mut out = [0u8; W];
    out[W - significant.len()..].copy_from_slice(significant);
    Ok(out)
}

/// Encode a field element into `W` big-endian bytes (`W ≤ 32`).
#[inline]
pub fn field_to_fixed<const W: usize>(f: &F) -> Result<[u8; W], FieldError> {
    fit::<W>(&to_be_bytes(f))
}

/// Encode an integer into `W` big-endian bytes.
#[inline]
pub fn u128_to_fixed<const W: usize>(v: u128) -> Result<[u8; W], FieldError> {
    fit::<W>(&v.to_be_bytes())
}

/// Decode a big-endian integer of arbitrary width into `u128`.
pub fn u128_from_be(bytes: &[u8]) -> Result<u128, FieldError> {
    let narrow = fit::<16>(bytes)?;
    Ok(u128::from_be_bytes(narrow))
}

/// Decode a big-endian integer of arbitrary width into `u64`.
pub fn u64_from_be(bytes: &[u8]) -> Result<u64, FieldError> {
    let narrow = fit::<8>(bytes)?;
    Ok(u64::from_be_bytes(narrow))
}

fn trim_leading_zeros(b: &[u8]) -> &[u8] {
    let first = b.iter().position(|&x| x != 0).unwrap_or(b.len());
    &b[first..]
}

// ============================================================================
// Strings
// ============================================================================

/// `0x`-prefixed, 32-byte, zero-padded hex (the ledger's `toFixedHex`).
pub fn to_fixed_hex<P: PrimeField<BigInt = BigInt<4>>>(f: &P) -> String {
    format!("0x{}", hex::encode(to_be_bytes(f)))
}

/// `0x`-prefixed hex of raw bytes.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode hex with an optional `0x` prefix. Odd lengths are left-padded.
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, FieldError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let padded;
    let even = if digits.len() % 2 == 1 {
        padded = format!("0{digits}");
        padded.as_str()
    } else {
        digits
    };
    hex::decode(even).map_err(|e| FieldError::Hex(e.to_string()))
}

/// Parse a hex-encoded field element, rejecting values `≥ modulus`.
///
/// A string with no digits (`""`, `"0x"`) is [`FieldError::Empty`], never zero.
pub fn from_hex<P: PrimeField>(s: &str) -> Result<P, FieldError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.is_empty() {
        return Err(FieldError::Empty(s.to_owned()));
    }
    let bytes = hex_to_bytes(s)?;
    if trim_leading_zeros(&bytes).len() > FIELD_BYTES {
        return Err(FieldError::OutOfRange);
    }
    from_be_bytes_checked(&bytes)
}

/// Parse a base-10 field element (snarkjs output), rejecting values `≥ modulus`.
///
/// `FromStr` on arkworks fields reduces silently, which is exactly what must
/// not happen to prover output, so the limbs are accumulated by hand.
pub fn parse_decimal<P: PrimeField<BigInt = BigInt<4>>>(s: &str) -> Result<P, FieldError> {
    let digits = s.trim();
    if digits.is_empty() {
        return Err(FieldError::Decimal(s.to_owned()));
    }
    let mut limbs = [0u64; 4];
    for ch in digits.chars() {
        let d = ch.to_digit(10).ok_or_else(|| FieldError::Decimal(s.to_owned()))?;
        let mut carry = u128::from(d);
        for limb in limbs.iter_mut() {
            let v = u128::from(*limb) * 10 + carry;
            *limb = v as u64;
            carry = v >> 64;
        }
        if carry != 0 {
            return Err(FieldError::OutOfRange);
        }
    }
    P::from_bigint(BigInt::new(limbs)).ok_or(FieldError::OutOfRange)
}

/// Base-10 rendering, the form circuit witnesses are fed in.
pub fn to_decimal<P: PrimeField>(f: &P) -> String {
    f.into_bigint().to_string()
}

// ============================================================================
// Sampling
// ============================================================================

/// Width of a random blinding factor (248 bits, always below the modulus).
pub const BLINDING_BYTES: usize = 31;

/// Sample a blinding factor from 31 random bytes.
pub fn random_blinding<R: RngCore + CryptoRng>(rng: &mut R) -> F {
    let mut buf = [0u8; BLINDING_BYTES];
    rng.fill_bytes(&mut buf);
    F::from_be_bytes_mod_order(&buf)
}

/// Sample a uniformly random scalar.
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> F {
    F::rand(rng)
}
