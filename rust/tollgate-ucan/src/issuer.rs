//! UCAN issuer trait.

use tollgate_credentials::{Principal, Signer};

/// An entity that can issue UCANs: it can sign tokens and is
/// identified by a DID.
///
/// Blanket-implemented for any type that is both a [`Signer`]
/// and a [`Principal`].
pub trait Issuer: Signer + Principal + Sync {}

impl<T> Issuer for T where T: Signer + Principal + Sync {}
