//! Minting delegations for granted requesters.

use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};
use tollgate_credentials::{Did, DidParseError};
use tollgate_policy::GrantMap;
use tollgate_ucan::{
    Ability, ArchiveError, DelegationArchive, ServerIdentity, SessionError,
};

/// Abilities delegated when the `ucan` grant names no claims.
pub const DEFAULT_ABILITIES: [&str; 3] = ["space/info", "upload/list", "upload/add"];

/// How long an issued delegation stays valid.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// The token type whose grant is delegated as a UCAN.
pub const UCAN_TOKEN_TYPE: &str = "ucan";

/// Errors from issuing a delegation.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    /// The requester's DID is malformed.
    #[error("invalid audience: {0}")]
    InvalidAudience(#[from] DidParseError),

    /// The server identity holds no proof for the configured space.
    #[error("no proof for space {0}")]
    SpaceNotFound(Did),

    /// Delegating through the session failed.
    #[error(transparent)]
    Session(SessionError),

    /// Archiving the delegation failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Issuance did not finish before the deadline.
    #[error("delegation issuance timed out")]
    Timeout,
}

impl From<SessionError> for IssueError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::SpaceNotFound(space) => IssueError::SpaceNotFound(space),
            other => IssueError::Session(other),
        }
    }
}

/// Issues delegations over one space on behalf of a [`ServerIdentity`].
///
/// Issuance is serialized: only one session is open at a time.
#[derive(Debug)]
pub struct DelegationIssuer {
    identity: ServerIdentity,
    space: Did,
    lifetime: Duration,
    session: Mutex<()>,
}

impl DelegationIssuer {
    /// An issuer delegating over `space` for [`DEFAULT_LIFETIME`].
    #[must_use]
    pub fn new(identity: ServerIdentity, space: Did) -> Self {
        Self {
            identity,
            space,
            lifetime: DEFAULT_LIFETIME,
            session: Mutex::new(()),
        }
    }

    /// Override the delegation lifetime.
    #[must_use]
    pub const fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// The server identity.
    #[must_use]
    pub const fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// The space delegations are issued over.
    #[must_use]
    pub const fn space(&self) -> &Did {
        &self.space
    }

    /// The abilities to delegate for `grant`: the `ucan` claims if any,
    /// otherwise [`DEFAULT_ABILITIES`].
    #[must_use]
    pub fn abilities(grant: &GrantMap) -> Vec<Ability> {
        match grant.get(UCAN_TOKEN_TYPE) {
            Some(access) if !access.claims.is_empty() => {
                access.claims.iter().map(|claim| Ability::from(claim.as_str())).collect()
            }
            _ => DEFAULT_ABILITIES.iter().copied().map(Ability::from).collect(),
        }
    }

    /// Delegate the abilities of `grant` to `user_did` and archive the result.
    ///
    /// The caller decides that `grant` holds the `ucan` token type; a grant
    /// without it is not delegated.
    ///
    /// # Errors
    ///
    /// Returns an error if `user_did` is malformed, the space has no proof,
    /// or signing or archiving fails.
    pub async fn issue(
        &self,
        grant: &GrantMap,
        user_did: &str,
    ) -> Result<DelegationArchive, IssueError> {
        let abilities = Self::abilities(grant);
        let audience: Did = user_did.parse()?;

        let delegation = {
            let _session = self.session.lock().await;
            self.identity
                .session(&self.space)?
                .delegate(&audience, abilities.iter().cloned(), self.lifetime)
                .await?
        };
        let archive = delegation.archive()?;

        tracing::info!(
            audience = %audience,
            abilities = ?abilities.iter().map(Ability::as_str).collect::<Vec<_>>(),
            cid = %archive.root(),
            expiration = ?delegation.expiration().map(|t| t.to_unix()),
            "issued delegation"
        );
        Ok(archive)
    }

    /// [`issue`][Self::issue] bounded by `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`IssueError::Timeout`] if the deadline passes first.
    pub async fn issue_until(
        &self,
        grant: &GrantMap,
        user_did: &str,
        deadline: Instant,
    ) -> Result<DelegationArchive, IssueError> {
        tokio::time::timeout_at(deadline, self.issue(grant, user_did))
            .await
            .map_err(|_| IssueError::Timeout)?
    }
}
