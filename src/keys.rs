//! Identity keys: one secret, two public keys, three capability levels
//!
//! ```text
//! secret s  (BN254 scalar, 32 bytes BE)
//!    |
//!    +---> hash-domain public key   P = Poseidon(s)   (commitments, circuit ownership)
//!    |
//!    +---> encryption public key    E = X25519(s)     (sealing note payloads)
//! ```
//!
//! Both public keys come from the same secret, so a wallet backs up exactly
//! one value. The two primitives are otherwise unrelated.
//!
//! Capability is a closed sum type rather than a runtime flag:
//!
//! | variant | secret | encryption key | can decrypt | can be sealed to |
//! |---|---|---|---|---|
//! | [`Identity::Full`] | yes | yes | yes | yes |
//! | [`Identity::Viewer`] | no | yes | no | yes |
//! | [`Identity::PublicOnly`] | no | no | no | no |
//!
//! APIs that need the secret take [`FullKeys`] directly so the requirement is
//! checked at compile time. The enum accessors exist for code that holds a
//! counterparty identity of unknown capability and fail with
//! [`Error::MissingSecret`] / [`Error::UnsupportedOperation`].

#![forbid(unsafe_code)]

use core::fmt;

use rand::{rngs::OsRng, CryptoRng, RngCore};

use crate::{
    encryption::{self, EncryptionError, KEY_BYTES},
    error::{Entity, Error, Result},
    field::{self, FieldError},
    poseidon::{self, HashError},
    F,
};

/// Hex characters in a serialized address (without `0x`).
pub const ADDRESS_HEX_LEN: usize = 128;

// ============================================================================
// Key newtypes
// ============================================================================

/// Hash-domain public key `Poseidon(secret)`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(F);

impl PublicKey {
    /// Wrap a field element already known to be a public key.
    pub fn new(value: F) -> Self {
        Self(value)
    }

    /// Parse a 32-byte big-endian public key, rejecting values `≥ FIELD_SIZE`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FieldError> {
        field::from_be_bytes_checked(bytes).map(Self)
    }

    /// Parse `0x`-hex.
    pub fn from_hex(s: &str) -> Result<Self, FieldError> {
        field::from_hex(s).map(Self)
    }

    /// The key as a field element.
    #[inline]
    pub fn to_field(&self) -> F {
        self.0
    }

    /// 32-byte big-endian encoding.
    #[inline]
    pub fn to_bytes(&self) -> [u8; 32] {
        field::to_be_bytes(&self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", field::to_fixed_hex(&self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&field::to_fixed_hex(&self.0))
    }
}

/// X25519 encryption public key.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct EncryptionKey([u8; KEY_BYTES]);

impl EncryptionKey {
    /// Wrap raw X25519 public key bytes.
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    /// Seal `plaintext` so only the holder of the matching secret can open it.
    pub fn seal<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, EncryptionError> {
        encryption::seal(plaintext, &self.0, rng)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey({})", hex::encode(self.0))
    }
}

// ============================================================================
// Capability variants
// ============================================================================

/// Secret plus both public keys. The only variant that can decrypt, sign, or
/// feed a secret into a circuit witness.
#[derive(Clone)]
pub struct FullKeys {
    secret: F,
    public_key: PublicKey,
    encryption_key: EncryptionKey,
}

impl FullKeys {
    /// Derive both public keys from `secret`.
    pub fn from_secret(secret: F) -> Result<Self, HashError> {
        let public_key = PublicKey(poseidon::hash(&[secret])?);
        let encryption_key =
            EncryptionKey(encryption::encryption_public_key(&field::to_be_bytes(&secret)));
        Ok(Self { secret, public_key, encryption_key })
    }

    /// Generate a fresh random identity.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, HashError> {
        Self::from_secret(field::random_scalar(rng))
    }

    /// Restore from a `0x`-hex secret. Values `≥ FIELD_SIZE` are rejected.
    pub fn from_secret_hex(s: &str) -> Result<Self> {
        let secret = field::from_hex(s)
            .map_err(|e| Error::validation(Entity::Identity, format!("secret: {e}")))?;
        Ok(Self::from_secret(secret)?)
    }

    /// Hash-domain secret.
    #[inline]
    pub fn secret(&self) -> &F {
        &self.secret
    }

    /// `Poseidon(secret)`.
    #[inline]
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// X25519 key derived from the secret.
    #[inline]
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption_key
    }

    /// Open a payload sealed to this identity.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        encryption::open(envelope, &field::to_be_bytes(&self.secret))
    }

    /// Seal to this identity (self-addressed recovery).
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, EncryptionError> {
        self.encryption_key.seal(plaintext, rng)
    }

    /// Ownership signature `Poseidon(secret, commitment, merklePath)`.
    pub fn sign(&self, commitment: &F, merkle_path: &F) -> Result<F, HashError> {
        poseidon::hash(&[self.secret, *commitment, *merkle_path])
    }

    /// Serialized address: hash key ∥ encryption key, 128 hex chars.
    pub fn address(&self) -> String {
        render_address(&self.public_key, &self.encryption_key)
    }

    /// Drop the secret.
    pub fn to_viewer(&self) -> ViewerKeys {
        ViewerKeys { public_key: self.public_key, encryption_key: self.encryption_key }
    }
}

impl fmt::Debug for FullKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullKeys")
            .field("secret", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .field("encryption_key", &self.encryption_key)
            .finish()
    }
}

/// Both public keys, no secret. Can be sealed to, cannot open or prove.
#[derive(Copy, Clone, Debug)]
pub struct ViewerKeys {
    public_key: PublicKey,
    encryption_key: EncryptionKey,
}

impl ViewerKeys {
    /// Pair a hash-domain key with an encryption key.
    pub fn new(public_key: PublicKey, encryption_key: EncryptionKey) -> Self {
        Self { public_key, encryption_key }
    }

    /// Hash-domain public key.
    #[inline]
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Key payloads are sealed to.
    #[inline]
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption_key
    }

    /// Serialized address: public key then encryption key, as hex.
    pub fn address(&self) -> String {
        render_address(&self.public_key, &self.encryption_key)
    }
}

fn render_address(pk: &PublicKey, ek: &EncryptionKey) -> String {
    let mut out = String::with_capacity(ADDRESS_HEX_LEN);
    out.push_str(&hex::encode(pk.to_bytes()));
    out.push_str(&hex::encode(ek.as_bytes()));
    out
}

// ============================================================================
// Identity (capability sum type)
// ============================================================================

/// A party to a stream, at whatever capability level is locally known.
///
/// Equality is hash-domain public key equality: two identities are the same
/// party even if one side only holds the public key.
#[derive(Clone, Debug)]
pub enum Identity {
    /// Holds the secret: can decrypt, sign, and prove.
    Full(FullKeys),
    /// From a serialized address: can be encrypted to.
    Viewer(ViewerKeys),
    /// Hash-domain key only.
    PublicOnly(PublicKey),
}

impl Identity {
    /// Create a full identity. A random secret is drawn when none is given.
    pub fn create(secret: Option<F>) -> Result<Self> {
        let keys = match secret {
            Some(s) => FullKeys::from_secret(s)?,
            None => FullKeys::random(&mut OsRng)?,
        };
        Ok(Identity::Full(keys))
    }

    /// Decode a serialized address (`0x` optional) into a secret-less identity.
    pub fn from_serialized_address(address: &str) -> Result<Self> {
        let digits = address.strip_prefix("0x").unwrap_or(address);
        if digits.len() != ADDRESS_HEX_LEN {
            return Err(Error::validation(
                Entity::Identity,
                format!("address must be {ADDRESS_HEX_LEN} hex characters (got {})", digits.len()),
            ));
        }
        let bytes = field::hex_to_bytes(digits)
            .map_err(|e| Error::validation(Entity::Identity, format!("address: {e}")))?;
        let (pk_bytes, ek_bytes) = bytes.split_at(32);
        let public_key = PublicKey::from_bytes(pk_bytes)
            .map_err(|e| Error::validation(Entity::Identity, format!("address public key: {e}")))?;
        let mut ek = [0u8; KEY_BYTES];
        ek.copy_from_slice(ek_bytes);
        Ok(Identity::Viewer(ViewerKeys::new(public_key, EncryptionKey(ek))))
    }

    /// Hash-domain key only; enough to re-derive a commitment.
    pub fn from_public_key(public_key: PublicKey) -> Self {
        Identity::PublicOnly(public_key)
    }

    /// Hash-domain public key, available at every capability level.
    pub fn public_key(&self) -> PublicKey {
        match self {
            Identity::Full(k) => k.public_key(),
            Identity::Viewer(k) => k.public_key(),
            Identity::PublicOnly(pk) => *pk,
        }
    }

    /// Fails with [`Error::UnsupportedOperation`] for a public-key-only identity.
    pub fn encryption_key(&self) -> Result<&EncryptionKey> {
        match self {
            Identity::Full(k) => Ok(k.encryption_key()),
            Identity::Viewer(k) => Ok(k.encryption_key()),
            Identity::PublicOnly(_) => Err(Error::UnsupportedOperation { operation: "encrypt" }),
        }
    }

    /// The full key set, or [`Error::MissingSecret`].
    pub fn full(&self) -> Result<&FullKeys> {
        match self {
            Identity::Full(k) => Ok(k),
            Identity::Viewer(_) | Identity::PublicOnly(_) => Err(Error::MissingSecret),
        }
    }

    /// Secret key, or [`Error::MissingSecret`].
    pub fn secret(&self) -> Result<&F> {
        self.full().map(FullKeys::secret)
    }

    /// Seal `plaintext` to this identity.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(self.encryption_key()?.seal(plaintext, &mut OsRng)?)
    }

    /// Open a payload sealed to this identity.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        match self {
            Identity::Full(k) => Ok(k.decrypt(envelope)?),
            Identity::Viewer(_) => Err(Error::MissingSecret),
            Identity::PublicOnly(_) => Err(Error::UnsupportedOperation { operation: "decrypt" }),
        }
    }

    /// Serialized address. Needs the encryption key.
    pub fn address(&self) -> Result<String> {
        match self {
            Identity::Full(k) => Ok(k.address()),
            Identity::Viewer(k) => Ok(k.address()),
            Identity::PublicOnly(_) => {
                Err(Error::UnsupportedOperation { operation: "render an address" })
            }
        }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}
impl Eq for Identity {}

impl From<FullKeys> for Identity {
    fn from(k: FullKeys) -> Self {
        Identity::Full(k)
    }
}

impl From<ViewerKeys> for Identity {
    fn from(k: ViewerKeys) -> Self {
        Identity::Viewer(k)
    }
}
