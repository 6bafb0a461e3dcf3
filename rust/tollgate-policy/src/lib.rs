//! Access policy evaluation.
//!
//! An [`AccessPolicy`] pairs a trust criterion (an environment allowlist, an
//! on-chain attestation, ownership of a name) with the [`Access`] it grants
//! for one token type. The [`PolicyEvaluator`] checks every policy against an
//! [`AuthInput`] concurrently and folds the granted ones, in input order, into
//! a [`GrantMap`].
//!
//! ```ignore
//! use tollgate_policy::{AccessPolicy, AuthInput, PolicyEvaluator};
//!
//! let evaluator = PolicyEvaluator::new(index);
//! let policies = AccessPolicy::from_json_slice(&bytes)?;
//! let grants = evaluator.evaluate(&policies, &input).await;
//! if let Some(ucan) = grants.get("ucan") {
//!     println!("claims: {:?}", ucan.claims);
//! }
//! ```

pub mod criteria;
pub mod error;
pub mod evaluator;
pub mod grant;
pub mod input;
pub mod policy;

pub use criteria::{
    CriterionProcessor,
    eas::{
        AttestationLookup,
        abi::{AbiError, AbiType, AbiValue, SchemaField},
        chain::{ChainConfig, ChainRegistry},
        index::{Attestation, AttestationIndex, AttestationQuery, GraphqlAttestationIndex, IndexError},
    },
    env::EnvAllowlist,
    nameservice::NameOwnership,
};
pub use error::{CriterionError, PolicyError};
pub use evaluator::{DEFAULT_TIMEOUT, PolicyEvaluator, PolicyEvaluatorBuilder};
pub use grant::GrantMap;
pub use input::{AuthContext, AuthInput};
pub use policy::{Access, AccessPolicy, CriteriaKind};
