//! Sealed-box note encryption (x25519-xsalsa20-poly1305)
//!
//! Payloads are sealed to a recipient's 32-byte encryption public key with a
//! fresh ephemeral keypair, the same construction the deployed wallet clients
//! use. The on-chain envelope is a fixed-order concatenation:
//!
//! ```text
//! nonce (24) || ephemeral public key (32) || box(base64(plaintext)) (len + 16)
//! ```
//!
//! The boxed text is the base64 rendering of the payload bytes. Opening a box
//! that was sealed to somebody else fails with [`EncryptionError::Decryption`],
//! which trial decryption treats as "not mine".

#![forbid(unsafe_code)]

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use crypto_box::{
    aead::{generic_array::GenericArray, Aead},
    PublicKey, SalsaBox, SecretKey,
};
use rand::{CryptoRng, RngCore};

/// Scheme tag carried by the deployed clients' envelopes.
pub const ENCRYPTION_VERSION: &str = "x25519-xsalsa20-poly1305";

/// Nonce width.
pub const NONCE_BYTES: usize = 24;
/// Encryption public key width (ephemeral and static).
pub const KEY_BYTES: usize = 32;
/// Poly1305 tag width.
pub const TAG_BYTES: usize = 16;
/// Smallest envelope that can possibly open.
pub const MIN_ENVELOPE_BYTES: usize = NONCE_BYTES + KEY_BYTES + TAG_BYTES;

/// Errors surfaced by sealing/opening.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncryptionError {
    /// Wrong recipient or tampered ciphertext.
    #[error("decryption failed")]
    Decryption,
    /// The envelope or its inner encoding is structurally broken.
    #[error("malformed envelope: {0}")]
    Envelope(String),
}

/// A parsed envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Per-message nonce.
    pub nonce: [u8; NONCE_BYTES],
    /// Sender's one-time X25519 public key.
    pub ephemeral_public_key: [u8; KEY_BYTES],
    /// Sealed plaintext with its tag.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Serialize in wire order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_BYTES + KEY_BYTES + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ephemeral_public_key);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split wire bytes. Anything shorter than nonce + key + tag cannot open.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncryptionError> {
        if bytes.len() < MIN_ENVELOPE_BYTES {
            return Err(EncryptionError::Envelope(format!(
                "{} bytes is shorter than the {MIN_ENVELOPE_BYTES}-byte minimum",
                bytes.len()
            )));
        }
        let (nonce, rest) = bytes.split_at(NONCE_BYTES);
        let (epk, ciphertext) = rest.split_at(KEY_BYTES);
        let mut out = Envelope {
            nonce: [0u8; NONCE_BYTES],
            ephemeral_public_key: [0u8; KEY_BYTES],
            ciphertext: ciphertext.to_vec(),
        };
        out.nonce.copy_from_slice(nonce);
        out.ephemeral_public_key.copy_from_slice(epk);
        Ok(out)
    }
}

/// Derive the x25519 public key for a 32-byte secret.
pub fn encryption_public_key(secret: &[u8; KEY_BYTES]) -> [u8; KEY_BYTES] {
    let sk = SecretKey::from(*secret);
    *sk.public_key().as_bytes()
}

/// Seal `plaintext` to `recipient` with a fresh ephemeral key and nonce.
pub fn seal<R: RngCore + CryptoRng>(
    plaintext: &[u8],
    recipient: &[u8; KEY_BYTES],
    rng: &mut R,
) -> Result<Vec<u8>, EncryptionError> {
    let mut ephemeral = [0u8; KEY_BYTES];
    rng.fill_bytes(&mut ephemeral);
    let mut nonce = [0u8; NONCE_BYTES];
    rng.fill_bytes(&mut nonce);

    let esk = SecretKey::from(ephemeral);
    let epk = *esk.public_key().as_bytes();
    let sbox = SalsaBox::new(&PublicKey::from(*recipient), &esk);

    let text = B64.encode(plaintext);
    let ciphertext = sbox
        .encrypt(&GenericArray::from(nonce), text.as_bytes())
        .map_err(|_| EncryptionError::Envelope("plaintext rejected by cipher".into()))?;

    Ok(Envelope { nonce, ephemeral_public_key: epk, ciphertext }.to_bytes())
}

/// Open an envelope with the recipient's secret.
pub fn open(envelope: &[u8], secret: &[u8; KEY_BYTES]) -> Result<Vec<u8>, EncryptionError> {
    let env = Envelope::from_bytes(envelope)?;
    let sbox = SalsaBox::new(&PublicKey::from(env.ephemeral_public_key), &SecretKey::from(*secret));
    let text = sbox
        .decrypt(&GenericArray::from(env.nonce), env.ciphertext.as_slice())
        .map_err(|_| EncryptionError::Decryption)?;
    B64.decode(&text).map_err(|e| EncryptionError::Envelope(format!("inner base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn keypair() -> ([u8; 32], [u8; 32]) {
        let mut sk = [0u8; 32];
        OsRng.fill_bytes(&mut sk);
        (sk, encryption_public_key(&sk))
    }

    #[test]
    fn seal_open_round_trip() {
        let (sk, pk) = keypair();
        let msg = b"rate|start|stop|blinding";
        let env = seal(msg, &pk, &mut OsRng).unwrap();
        assert_eq!(open(&env, &sk).unwrap(), msg.to_vec());
    }

    #[test]
    fn wrong_recipient_is_a_decryption_error() {
        let (_, pk) = keypair();
        let (other_sk, _) = keypair();
        let env = seal(b"hello", &pk, &mut OsRng).unwrap();
        assert_eq!(open(&env, &other_sk), Err(EncryptionError::Decryption));
    }

    #[test]
    fn tampering_is_detected() {
        let (sk, pk) = keypair();
        let mut env = seal(b"hello", &pk, &mut OsRng).unwrap();
        let last = env.len() - 1;
        env[last] ^= 0x01;
        assert_eq!(open(&env, &sk), Err(EncryptionError::Decryption));
    }

    #[test]
    fn truncated_envelope_is_structural() {
        let (sk, _) = keypair();
        let short = vec![0u8; MIN_ENVELOPE_BYTES - 1];
        assert!(matches!(open(&short, &sk), Err(EncryptionError::Envelope(_))));
    }

    #[test]
    fn envelope_layout_is_nonce_then_key() {
        let (_, pk) = keypair();
        let env = seal(&[7u8; 10], &pk, &mut OsRng).unwrap();
        let parsed = Envelope::from_bytes(&env).unwrap();
        // base64 of 10 bytes is 16 chars, plus the tag.
        assert_eq!(parsed.ciphertext.len(), 16 + TAG_BYTES);
        assert_eq!(parsed.to_bytes(), env);
    }
}
