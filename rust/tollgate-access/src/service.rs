//! The access service: policy evaluation followed by delegation issuance.

use std::sync::Arc;

use tokio::time::Instant;
use tollgate_policy::{
    AccessPolicy, AuthInput, GrantMap, GraphqlAttestationIndex, IndexError, PolicyEvaluator,
};
use tollgate_ucan::{
    ArchiveError, Delegation, DelegationArchive, DelegationVerifier, ServiceError,
    SessionBinding, SessionError, TrustAnchor, VerificationError, VerifiedDelegation,
    VerifiedSession,
};
use tracing::debug;

use crate::{
    config::{AccessConfig, ConfigError},
    issuer::{DelegationIssuer, IssueError, UCAN_TOKEN_TYPE},
};

/// Errors from the access service. Denial is not one of them; see
/// [`Authorization::Denied`].
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The service could not be configured.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The attestation index could not be created.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The server identity cannot anchor a verifier.
    #[error(transparent)]
    Identity(#[from] SessionError),

    /// Issuing the delegation failed.
    #[error(transparent)]
    Issue(#[from] IssueError),

    /// A presented archive could not be read.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// A presented delegation or attestation did not verify.
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

impl From<IssueError> for ServiceError {
    fn from(error: IssueError) -> Self {
        match error {
            IssueError::InvalidAudience(_) => ServiceError::invalid_argument(error.to_string()),
            IssueError::Session(inner) => inner.into(),
            IssueError::Archive(inner) => inner.into(),
            IssueError::Timeout => ServiceError::timeout(error.to_string()),
            IssueError::SpaceNotFound(_) => ServiceError::internal(error.to_string()),
        }
    }
}

impl From<AccessError> for ServiceError {
    fn from(error: AccessError) -> Self {
        match error {
            AccessError::Config(_) | AccessError::Index(_) => ServiceError::internal(error.to_string()),
            AccessError::Identity(inner) => inner.into(),
            AccessError::Issue(inner) => inner.into(),
            AccessError::Archive(inner) => inner.into(),
            AccessError::Verification(inner) => inner.into(),
        }
    }
}

/// The outcome of [`AccessService::authorize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    /// No policy granted anything.
    Denied,
    /// Some policy granted access.
    Granted {
        /// Everything granted, by token type.
        grants: GrantMap,
        /// The delegation issued for the requester, present iff the `ucan`
        /// token type was granted.
        delegation: Option<DelegationArchive>,
    },
}

impl Authorization {
    /// Returns `true` if access was granted.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Authorization::Granted { .. })
    }

    /// The grants and delegation, or an `ACCESS_DENIED` error.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::access_denied`] for [`Authorization::Denied`].
    pub fn into_result(self) -> Result<(GrantMap, Option<DelegationArchive>), ServiceError> {
        match self {
            Authorization::Granted { grants, delegation } => Ok((grants, delegation)),
            Authorization::Denied => Err(ServiceError::access_denied()),
        }
    }
}

/// Decides access for requesters and issues or verifies their delegations.
#[derive(Debug)]
pub struct AccessService {
    evaluator: PolicyEvaluator,
    issuer: DelegationIssuer,
    authority: DelegationVerifier,
    delegations: DelegationVerifier,
}

impl AccessService {
    /// A service evaluating with `evaluator`, issuing with `issuer`, and
    /// trusting attestations from `authority`.
    ///
    /// Delegations are verified against the issuer's own root proof.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer's root proof cannot anchor a verifier.
    pub fn new(
        evaluator: PolicyEvaluator,
        issuer: DelegationIssuer,
        authority: TrustAnchor,
    ) -> Result<Self, AccessError> {
        let delegations = issuer.identity().verifier()?;
        Ok(Self {
            evaluator,
            issuer,
            authority: DelegationVerifier::new(authority),
            delegations,
        })
    }

    /// Build the service from process configuration, querying attestations
    /// over GraphQL.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &AccessConfig) -> Result<Self, AccessError> {
        let timeout = config.attestation_timeout();
        let index = GraphqlAttestationIndex::new(timeout)?;
        let evaluator = PolicyEvaluator::builder()
            .defaults(Arc::new(index), config.chains())
            .timeout(timeout)
            .build();
        let issuer = DelegationIssuer::new(config.server_identity()?, config.space()?);
        Self::new(evaluator, issuer, config.trust_anchor()?)
    }

    /// The policy evaluator.
    #[must_use]
    pub const fn evaluator(&self) -> &PolicyEvaluator {
        &self.evaluator
    }

    /// The delegation issuer.
    #[must_use]
    pub const fn issuer(&self) -> &DelegationIssuer {
        &self.issuer
    }

    /// Evaluate `policies` for `input` and, if the `ucan` token type is
    /// granted, issue a delegation to the subject.
    ///
    /// # Errors
    ///
    /// Returns an error if issuance fails. Denial is not an error.
    pub async fn authorize(
        &self,
        policies: &[AccessPolicy],
        input: &AuthInput,
    ) -> Result<Authorization, AccessError> {
        let grants = self.evaluator.evaluate(policies, input).await;
        self.grant(grants, input, None).await
    }

    /// [`authorize`][Self::authorize] with every step bounded by `deadline`.
    ///
    /// Criteria still running at the deadline deny; issuance still running
    /// at the deadline fails with a timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if issuance fails or times out.
    pub async fn authorize_until(
        &self,
        policies: &[AccessPolicy],
        input: &AuthInput,
        deadline: Instant,
    ) -> Result<Authorization, AccessError> {
        let grants = self.evaluator.evaluate_until(policies, input, deadline).await;
        self.grant(grants, input, Some(deadline)).await
    }

    async fn grant(
        &self,
        grants: GrantMap,
        input: &AuthInput,
        deadline: Option<Instant>,
    ) -> Result<Authorization, AccessError> {
        if grants.is_empty() {
            debug!(subject = %input.subject, "no policy granted access");
            return Ok(Authorization::Denied);
        }

        if grants.get(UCAN_TOKEN_TYPE).is_none() {
            debug!(subject = %input.subject, "granted without a ucan token type");
            return Ok(Authorization::Granted {
                grants,
                delegation: None,
            });
        }

        let subject = input.subject.as_str();
        let delegation = match deadline {
            Some(deadline) => self.issuer.issue_until(&grants, subject, deadline).await?,
            None => self.issuer.issue(&grants, subject).await?,
        };
        Ok(Authorization::Granted {
            grants,
            delegation: Some(delegation),
        })
    }

    /// Verify that the trusted authority attests `binding` through `proofs`.
    ///
    /// # Errors
    ///
    /// Returns the verification failure.
    pub async fn verify_session(
        &self,
        binding: &SessionBinding,
        proofs: &[Delegation],
    ) -> Result<VerifiedSession, AccessError> {
        Ok(self.authority.verify_attestation(binding, proofs).await?)
    }

    /// Verify a delegation archive previously issued by this service.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is malformed or the chain does not
    /// verify against the root proof's issuer.
    pub async fn verify_delegation(&self, archive: &[u8]) -> Result<VerifiedDelegation, AccessError> {
        let delegation = Delegation::extract(archive)?;
        Ok(self.delegations.verify_delegation(&delegation).await?)
    }
}
