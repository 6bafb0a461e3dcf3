//! Ed25519 DID principal and verifier.

use super::{ED25519_PUB, Ed25519Signature, error::Ed25519DidFromStrError};
use crate::{Did, Principal, Verifier};
use base58::{FromBase58, ToBase58};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// An `Ed25519` `did:key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Verifier(pub VerifyingKey);

impl Ed25519Verifier {
    /// Get the raw public key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<VerifyingKey> for Ed25519Verifier {
    fn from(key: VerifyingKey) -> Self {
        Ed25519Verifier(key)
    }
}

impl From<&ed25519_dalek::SigningKey> for Ed25519Verifier {
    fn from(key: &ed25519_dalek::SigningKey) -> Self {
        Ed25519Verifier(key.verifying_key())
    }
}

impl std::fmt::Display for Ed25519Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut raw_bytes = Vec::with_capacity(34);
        raw_bytes.extend_from_slice(&ED25519_PUB);
        raw_bytes.extend_from_slice(&self.0.to_bytes());
        write!(f, "did:key:z{}", raw_bytes.to_base58())
    }
}

impl FromStr for Ed25519Verifier {
    type Err = Ed25519DidFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some("did"), Some("key"), Some(encoded)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Ed25519DidFromStrError::InvalidDidHeader);
        };
        let b58 = encoded
            .strip_prefix('z')
            .ok_or(Ed25519DidFromStrError::MissingBase58Prefix)?;
        let key_bytes = b58
            .from_base58()
            .map_err(|_| Ed25519DidFromStrError::InvalidBase58)?;
        let raw: [u8; 34] = key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| Ed25519DidFromStrError::InvalidKey)?;
        if raw[..2] != ED25519_PUB {
            return Err(Ed25519DidFromStrError::InvalidKey);
        }
        let key_arr: [u8; 32] = raw[2..]
            .try_into()
            .map_err(|_| Ed25519DidFromStrError::InvalidKey)?;
        let key =
            VerifyingKey::from_bytes(&key_arr).map_err(|_| Ed25519DidFromStrError::InvalidKey)?;
        Ok(Ed25519Verifier(key))
    }
}

impl Verifier for Ed25519Verifier {
    async fn verify(&self, msg: &[u8], signature: &Ed25519Signature) -> Result<(), signature::Error> {
        self.0.verify_strict(msg, signature)
    }
}

impl Principal for Ed25519Verifier {
    fn did(&self) -> Did {
        Did::from_trusted(self.to_string())
    }
}

impl Serialize for Ed25519Verifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ed25519Verifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|e| serde::de::Error::custom(format!("{s}: {e}")))
    }
}
