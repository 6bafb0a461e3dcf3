//! Ed25519 key types, `did:key` principal, signer and resolver.

mod error;
mod resolver;
mod signer;
mod verifier;

pub use error::{Ed25519DidFromStrError, Ed25519KeyError, Ed25519ResolveError};
pub use resolver::Ed25519KeyResolver;
pub use signer::Ed25519Signer;
pub use verifier::Ed25519Verifier;

/// Ed25519 signature produced by [`Ed25519Signer`].
pub type Ed25519Signature = ed25519_dalek::Signature;

/// Multicodec prefix for an ed25519 public key (`0xed 0x01`).
pub(crate) const ED25519_PUB: [u8; 2] = [0xed, 0x01];
