//! DID, principal and signing types shared by the tollgate crates.
//!
//! - [`Did`] is a parsed `did:<method>:<id>` string
//! - [`Principal`] is anything identified by a DID
//! - [`Signer`] and [`Verifier`] produce and check Ed25519 signatures
//! - [`Ed25519Signer`] / [`Ed25519Verifier`] are the `did:key` implementations
//!
//! Key custody is the caller's concern: signers are constructed from seed
//! bytes and never persisted by this crate.

pub mod did;
pub mod ed25519;
pub mod principal;
pub mod resolver;
pub mod signature;

pub use did::{Did, DidParseError};
pub use ed25519::*;
pub use principal::Principal;
pub use resolver::Resolver;
pub use signature::{Signer, Verifier};
