//! DID-to-verifier resolution.

use crate::{did::Did, signature::Verifier};

/// Resolves a DID to a [`Verifier`].
///
/// Given a DID, derives the public key material needed to verify its
/// signatures. DIDs that do not embed key material fail to resolve.
pub trait Resolver {
    /// The verifier produced for a resolved DID.
    type Verifier: Verifier + Send + Sync;

    /// Error type for resolution failures.
    type Error: std::error::Error;

    /// Resolve a DID to a verifier.
    fn resolve(&self, did: &Did) -> Result<Self::Verifier, Self::Error>;
}
