//! Error types for Ed25519 key operations.

use thiserror::Error;

/// Errors from [`super::Ed25519Signer::generate`] and [`super::Ed25519Signer::import`].
#[derive(Debug, Clone, Error)]
pub enum Ed25519KeyError {
    /// The seed bytes have the wrong length (expected 32).
    #[error("expected 32 seed bytes, got {0}")]
    InvalidSeedLength(usize),

    /// Random number generation failed.
    #[error("RNG error: {0}")]
    Rng(getrandom::Error),
}

impl From<getrandom::Error> for Ed25519KeyError {
    fn from(e: getrandom::Error) -> Self {
        Self::Rng(e)
    }
}

/// Errors that can occur when parsing an [`super::Ed25519Verifier`] from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Ed25519DidFromStrError {
    /// The DID header is invalid.
    #[error("invalid did header")]
    InvalidDidHeader,

    /// The base58 prefix 'z' is missing.
    #[error("missing base58 prefix 'z'")]
    MissingBase58Prefix,

    /// The base58 encoding is invalid.
    #[error("invalid base58 encoding")]
    InvalidBase58,

    /// The key bytes are invalid.
    #[error("invalid key bytes")]
    InvalidKey,
}

/// Error type for Ed25519 DID resolution.
#[derive(Debug, Clone, Copy, Error)]
pub enum Ed25519ResolveError {
    /// The DID could not be parsed as an Ed25519 did:key.
    #[error("invalid ed25519 did:key: {0}")]
    InvalidDid(#[from] Ed25519DidFromStrError),
}
