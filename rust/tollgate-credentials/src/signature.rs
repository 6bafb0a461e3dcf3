//! Signature creation and verification traits.

use std::future::Future;

use crate::ed25519::Ed25519Signature;

/// Produces an Ed25519 signature over a payload.
///
/// Async so that remote or hardware-backed keys can implement it.
pub trait Signer {
    /// Sign `payload` and return the signature.
    fn sign(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<Ed25519Signature, signature::Error>> + Send;
}

/// Verifies that an Ed25519 signature is valid for a given payload.
pub trait Verifier {
    /// Verify that `signature` is valid for `payload`.
    fn verify(
        &self,
        payload: &[u8],
        signature: &Ed25519Signature,
    ) -> impl Future<Output = Result<(), signature::Error>> + Send;
}
