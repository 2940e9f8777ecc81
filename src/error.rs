//! Crate-level error taxonomy
//!
//! Leaf concerns keep their own small `thiserror` enums (`HashError`,
//! `EncryptionError`, `TreeError`, `BackendError`) and fold into
//! [`Error`] at the note/prover layer. The variants below are the categories a
//! caller actually branches on:
//!
//! - [`Error::Decryption`] means "not addressed to me (or corrupted)". Trial
//!   decryption treats it as a skip.
//! - [`Error::Decode`] means decryption succeeded but the plaintext did not
//!   parse. Also a skip during scanning, but worth a log line.
//! - [`Error::Validation`] is a malformed construction and is never coerced.
//! - [`Error::MissingDependency`] is a programmer error: a derived value was
//!   requested before its input existed.
//!
//! No path in this crate substitutes a default value for a missing
//! cryptographic input.

#![forbid(unsafe_code)]

use crate::{
    backend::BackendError, encryption::EncryptionError, ledger::OracleError, merkle::TreeError,
    poseidon::HashError,
};

/// Which note-like entity an error refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Entity {
    /// Identity key material.
    Identity,
    /// A stream note.
    Stream,
    /// A checkpoint note.
    Checkpoint,
    /// A claim (checkpoint transition) request.
    Claim,
    /// A ledger leaf-insertion event.
    LedgerEvent,
}

impl core::fmt::Display for Entity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Entity::Identity => "identity",
            Entity::Stream => "stream",
            Entity::Checkpoint => "checkpoint",
            Entity::Claim => "claim",
            Entity::LedgerEvent => "ledger event",
        })
    }
}

/// Errors surfaced by note construction, decoding, and proof assembly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected construction input.
    #[error("invalid {entity}: {reason}")]
    Validation {
        /// What was being built.
        entity: Entity,
        /// Which check failed.
        reason: String,
    },

    /// Ciphertext did not open under this identity.
    #[error("payload is not addressed to this identity or is corrupted")]
    Decryption,

    /// Plaintext opened but did not parse.
    #[error("malformed {entity} payload: {reason}")]
    Decode {
        /// What was being decoded.
        entity: Entity,
        /// Parse failure.
        reason: String,
    },

    /// A derived value was requested before its input existed.
    #[error("{entity} is missing {what}")]
    MissingDependency {
        /// Owner of the missing input.
        entity: Entity,
        /// The missing input.
        what: &'static str,
    },

    /// Operation needs the identity's secret key.
    #[error("identity has no secret key")]
    MissingSecret,

    /// Operation the identity's variant cannot perform.
    #[error("identity cannot {operation}")]
    UnsupportedOperation {
        /// Attempted operation.
        operation: &'static str,
    },

    /// A leaf that should be in a local tree is not.
    #[error("leaf {leaf} not found in {tree} tree")]
    NotFound {
        /// Tree name.
        tree: &'static str,
        /// Leaf as hex.
        leaf: String,
    },

    /// Proof backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Poseidon failure.
    #[error(transparent)]
    Hash(#[from] HashError),

    /// Merkle tree failure.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Nullifier oracle failure.
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

impl Error {
    pub(crate) fn validation(entity: Entity, reason: impl Into<String>) -> Self {
        Error::Validation { entity, reason: reason.into() }
    }

    pub(crate) fn decode(entity: Entity, reason: impl core::fmt::Display) -> Self {
        Error::Decode { entity, reason: reason.to_string() }
    }

    pub(crate) fn missing(entity: Entity, what: &'static str) -> Self {
        Error::MissingDependency { entity, what }
    }

    /// True for failures a trial-decrypting scanner should skip over.
    pub fn is_not_mine(&self) -> bool {
        matches!(self, Error::Decryption | Error::Decode { .. } | Error::Validation { .. })
    }
}

impl From<EncryptionError> for Error {
    fn from(e: EncryptionError) -> Self {
        match e {
            EncryptionError::Decryption => Error::Decryption,
            EncryptionError::Envelope(reason) => {
                Error::Decode { entity: Entity::Identity, reason }
            }
        }
    }
}

/// Result alias used across the note and prover layers.
pub type Result<T, E = Error> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_skippable_errors() {
        assert!(Error::Decryption.is_not_mine());
        assert!(Error::decode(Entity::Stream, "short").is_not_mine());
        assert!(Error::validation(Entity::Checkpoint, "other stream").is_not_mine());
        assert!(!Error::missing(Entity::Stream, "leaf index").is_not_mine());
        assert!(!Error::MissingSecret.is_not_mine());
    }

    #[test]
    fn messages_name_the_entity() {
        let e = Error::missing(Entity::Checkpoint, "leaf index");
        assert_eq!(e.to_string(), "checkpoint is missing leaf index");
        let e = Error::validation(Entity::Stream, "stop time must exceed start time");
        assert_eq!(e.to_string(), "invalid stream: stop time must exceed start time");
    }
}
