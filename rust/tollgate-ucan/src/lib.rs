//! UCAN delegation issuance and verification.
//!
//! This crate provides the capability-security primitives used by the
//! tollgate access service:
//!
//! 1. [`Delegation`]: a signed, content-addressed grant of [`Capability`]s
//!    from an issuer to an audience, linked to its proofs by CID
//! 2. [`DelegationArchive`]: a CAR encoding of a delegation and its proof
//!    chain, used as a bearer credential
//! 3. [`ServerIdentity`] / [`ServerIdentitySession`]: the agent key and the
//!    root proofs anchoring its authority over a space
//! 4. [`DelegationVerifier`]: validates delegation chains and
//!    authority attestations against a [`TrustAnchor`]
//!
//! # Example
//!
//! ```ignore
//! use tollgate_ucan::{Ability, ServerIdentity};
//!
//! let session = identity.session(&space)?;
//! let delegation = session
//!     .delegate(&user_did, [Ability::from("upload/add")], lifetime)
//!     .await?;
//! let archive = delegation.archive()?;
//! let verified = identity.verifier()?.verify_delegation(&delegation).await?;
//! ```

pub mod archive;
pub mod capability;
pub mod cid;
pub mod delegation;
pub mod error;
pub mod issuer;
pub mod session;
pub mod time;
pub mod verify;

pub use archive::{ArchiveError, DelegationArchive, MAX_ARCHIVE_BLOCKS, MAX_CHAIN_DEPTH};
pub use capability::{Ability, Capability};
pub use delegation::{Delegation, DelegationError, DelegationPayload, builder::DelegationBuilder};
pub use error::{ErrorCode, ServiceError};
pub use issuer::Issuer;
pub use session::{ServerIdentity, ServerIdentitySession, SessionError};
pub use time::{TimeRange, Timestamp};
pub use verify::{
    ATTEST_ABILITY, DelegationVerifier, SessionBinding, TrustAnchor, VerificationError,
    VerifiedDelegation, VerifiedSession,
};
