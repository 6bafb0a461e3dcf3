//! Ed25519 signer implementation.

use super::{Ed25519Signature, error::Ed25519KeyError, verifier::Ed25519Verifier};
use crate::{Did, Principal, Signer};
use ed25519_dalek::SigningKey;
use serde::Serialize;

/// An `Ed25519` `did:key` signer.
///
/// Wraps an `ed25519_dalek::SigningKey` together with its derived
/// [`Ed25519Verifier`], so the DID is computed once.
#[derive(Clone)]
pub struct Ed25519Signer {
    did: Ed25519Verifier,
    signer: SigningKey,
}

impl From<SigningKey> for Ed25519Signer {
    fn from(signer: SigningKey) -> Self {
        let did = Ed25519Verifier::from(&signer);
        Self { did, signer }
    }
}

impl Ed25519Signer {
    /// Generate a new Ed25519 keypair from OS randomness.
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG fails.
    pub fn generate() -> Result<Self, Ed25519KeyError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)?;
        Ok(SigningKey::from_bytes(&seed).into())
    }

    /// Import a keypair from its 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed has the wrong length.
    pub fn import(seed: &[u8]) -> Result<Self, Ed25519KeyError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| Ed25519KeyError::InvalidSeedLength(seed.len()))?;
        Ok(SigningKey::from_bytes(&seed).into())
    }

    /// Export the 32-byte seed.
    #[must_use]
    pub fn export(&self) -> [u8; 32] {
        self.signer.to_bytes()
    }

    /// Get the associated Ed25519 DID (verifier).
    #[must_use]
    pub const fn ed25519_did(&self) -> &Ed25519Verifier {
        &self.did
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("did", &self.did.to_string())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.did)
    }
}

impl Signer for Ed25519Signer {
    async fn sign(&self, msg: &[u8]) -> Result<Ed25519Signature, signature::Error> {
        use signature::Signer as _;
        self.signer.try_sign(msg)
    }
}

impl Principal for Ed25519Signer {
    fn did(&self) -> Did {
        self.did.did()
    }
}

impl Serialize for Ed25519Signer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.did.serialize(serializer)
    }
}
