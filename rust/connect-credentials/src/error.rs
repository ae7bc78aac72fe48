//! Error types for delegate key operations.

use thiserror::Error;

/// Errors from generating, importing or exporting a delegate key.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// The seed bytes have the wrong length (expected 32).
    #[error("expected 32 seed bytes, got {0}")]
    InvalidSeedLength(usize),

    /// Random number generation failed.
    #[error("RNG error: {0}")]
    Rng(getrandom::Error),

    /// An exported key is not a private Ed25519 JWK.
    #[error("unsupported key: {0}")]
    UnsupportedKey(String),

    /// Base64url key material could not be decoded.
    #[error("invalid key encoding: {0}")]
    Encoding(String),
}

impl From<getrandom::Error> for CredentialError {
    fn from(error: getrandom::Error) -> Self {
        Self::Rng(error)
    }
}

/// Errors that can occur when parsing an Ed25519 `did:key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum DidKeyError {
    /// The DID header is not `did:key`.
    #[error("invalid did header")]
    InvalidDidHeader,

    /// The base58 prefix 'z' is missing.
    #[error("missing base58 prefix 'z'")]
    MissingBase58Prefix,

    /// The key bytes are invalid or not an Ed25519 multicodec key.
    #[error("invalid key bytes")]
    InvalidKey,
}
