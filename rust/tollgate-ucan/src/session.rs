//! The server's own identity and its per-space sessions.

use crate::{
    capability::{Ability, Capability},
    delegation::{Delegation, DelegationError},
    time::Timestamp,
    verify::{DelegationVerifier, TrustAnchor},
};
use std::time::Duration;
use tollgate_credentials::{Did, Ed25519Signer, Ed25519Verifier, Principal};

/// Errors from opening a session or delegating through it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No root proof delegates capabilities over the space to the agent.
    #[error("no proof delegates {0} to the agent")]
    SpaceNotFound(Did),

    /// The root proof does not cover a requested ability.
    #[error("agent does not hold {can} on {with}")]
    NotHeld {
        /// The space
        with: String,
        /// The ability requested
        can: Ability,
    },

    /// The identity has no root proofs.
    #[error("server identity has no proofs")]
    NoProofs,

    /// The root proof issuer is not a `did:key`, so no anchor key is known.
    #[error("root issuer {0} has no embedded key")]
    UnsupportedAuthority(Did),

    /// Building or signing the delegation failed.
    #[error(transparent)]
    Delegation(#[from] DelegationError),
}

/// The agent key together with the root proofs that anchor its authority.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    agent: Ed25519Signer,
    proofs: Vec<Delegation>,
}

impl ServerIdentity {
    /// An identity for `agent`, authorized by `proofs`.
    #[must_use]
    pub const fn new(agent: Ed25519Signer, proofs: Vec<Delegation>) -> Self {
        Self { agent, proofs }
    }

    /// The agent signer.
    #[must_use]
    pub const fn agent(&self) -> &Ed25519Signer {
        &self.agent
    }

    /// The root proofs.
    #[must_use]
    pub fn proofs(&self) -> &[Delegation] {
        &self.proofs
    }

    /// Every resource the agent holds a capability on, in proof order.
    #[must_use]
    pub fn spaces(&self) -> Vec<&str> {
        let agent = self.agent.did();
        let mut spaces: Vec<&str> = Vec::new();
        for proof in self.proofs.iter().filter(|p| p.audience() == &agent) {
            for capability in proof.capabilities() {
                if !spaces.contains(&capability.with.as_str()) {
                    spaces.push(&capability.with);
                }
            }
        }
        spaces
    }

    /// Open a session scoped to `space`, backed by every proof addressed to
    /// the agent that names the space.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SpaceNotFound`] if no proof addressed to the
    /// agent names the space.
    pub fn session(&self, space: &Did) -> Result<ServerIdentitySession<'_>, SessionError> {
        let agent = self.agent.did();
        let proofs: Vec<&Delegation> = self
            .proofs
            .iter()
            .filter(|proof| {
                proof.audience() == &agent
                    && proof
                        .capabilities()
                        .iter()
                        .any(|capability| capability.with == space.as_str())
            })
            .collect();
        if proofs.is_empty() {
            return Err(SessionError::SpaceNotFound(space.clone()));
        }

        tracing::debug!(
            space = %space,
            proofs = ?proofs.iter().map(|proof| proof.cid().to_string()).collect::<Vec<_>>(),
            "selected root proofs"
        );

        Ok(ServerIdentitySession {
            agent: &self.agent,
            space: space.clone(),
            proofs,
        })
    }

    /// A verifier anchored at the issuer of the first root proof.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no proofs or the root issuer is not a
    /// `did:key`.
    pub fn verifier(&self) -> Result<DelegationVerifier, SessionError> {
        let root = self.proofs.first().ok_or(SessionError::NoProofs)?;
        let key: Ed25519Verifier = root
            .issuer()
            .as_str()
            .parse()
            .map_err(|_| SessionError::UnsupportedAuthority(root.issuer().clone()))?;
        Ok(DelegationVerifier::new(TrustAnchor::from(key)))
    }
}

/// A [`ServerIdentity`] scoped to a single space and the proofs backing it.
#[derive(Debug, Clone)]
pub struct ServerIdentitySession<'a> {
    agent: &'a Ed25519Signer,
    space: Did,
    proofs: Vec<&'a Delegation>,
}

impl ServerIdentitySession<'_> {
    /// The space this session delegates over.
    #[must_use]
    pub const fn space(&self) -> &Did {
        &self.space
    }

    /// The root proofs naming the space, in identity order.
    #[must_use]
    pub fn proofs(&self) -> &[&Delegation] {
        &self.proofs
    }

    /// Delegate `abilities` on the space to `audience` for `lifetime`.
    ///
    /// # Errors
    ///
    /// Returns an error if no root proof covers an ability, no ability is
    /// requested, or signing fails.
    ///
    /// Only the proofs needed to cover the abilities are cited, in identity
    /// order.
    pub async fn delegate(
        &self,
        audience: &Did,
        abilities: impl IntoIterator<Item = Ability>,
        lifetime: Duration,
    ) -> Result<Delegation, SessionError> {
        let capabilities = abilities
            .into_iter()
            .map(|can| Capability::new(self.space.as_str(), can))
            .collect::<Vec<_>>();

        let mut cited = vec![false; self.proofs.len()];
        for requested in &capabilities {
            let covering = self
                .proofs
                .iter()
                .position(|proof| proof.capabilities().iter().any(|held| held.covers(requested)))
                .ok_or_else(|| SessionError::NotHeld {
                    with: requested.with.clone(),
                    can: requested.can.clone(),
                })?;
            cited[covering] = true;
        }
        let proofs = self
            .proofs
            .iter()
            .zip(cited)
            .filter(|(_, cited)| *cited)
            .map(|(proof, _)| (*proof).clone());

        let delegation = Delegation::builder()
            .audience(audience)
            .capabilities(capabilities)
            .expiration(Timestamp::now().after(lifetime))
            .proofs(proofs)
            .sign(self.agent)
            .await?;
        Ok(delegation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_credentials::did;

    async fn identity() -> (Ed25519Signer, ServerIdentity) {
        let space = Ed25519Signer::import(&[1; 32]).unwrap();
        let agent = Ed25519Signer::import(&[2; 32]).unwrap();
        let root = Delegation::builder()
            .audience(&agent)
            .capability(Capability::new(space.did().as_str(), "space/*"))
            .capability(Capability::new(space.did().as_str(), "upload/*"))
            .sign(&space)
            .await
            .unwrap();
        (space, ServerIdentity::new(agent, vec![root]))
    }

    #[tokio::test]
    async fn it_selects_the_proof_for_a_space() {
        let (space, identity) = identity().await;
        assert_eq!(identity.spaces(), vec![space.did().as_str()]);

        let session = identity.session(&space.did()).unwrap();
        assert_eq!(session.space(), &space.did());
        assert_eq!(session.proofs(), &[&identity.proofs()[0]]);

        let other = did!("key:z6MkotherSpace");
        assert!(matches!(identity.session(&other), Err(SessionError::SpaceNotFound(_))));
    }

    #[tokio::test]
    async fn it_refuses_abilities_it_does_not_hold() {
        let (space, identity) = identity().await;
        let session = identity.session(&space.did()).unwrap();
        let result = session
            .delegate(
                &did!("mailto:example.com:alice"),
                [Ability::from("store/remove")],
                Duration::from_secs(60),
            )
            .await;
        assert!(matches!(result, Err(SessionError::NotHeld { .. })));
    }

    #[tokio::test]
    async fn it_issues_verifiable_delegations() {
        let (space, identity) = identity().await;
        let user = did!("mailto:example.com:alice");
        let session = identity.session(&space.did()).unwrap();
        let delegation = session
            .delegate(
                &user,
                [Ability::from("space/info"), Ability::from("upload/add")],
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert_eq!(delegation.issuer(), &identity.agent().did());
        assert_eq!(delegation.capabilities().len(), 2);
        assert!(delegation.expiration().is_some());

        let verified = identity
            .verifier()
            .unwrap()
            .verify_delegation(&delegation)
            .await
            .unwrap();
        assert_eq!(verified.audience, user);
    }

    #[tokio::test]
    async fn it_draws_on_every_proof_for_the_space() {
        let space = Ed25519Signer::import(&[1; 32]).unwrap();
        let agent = Ed25519Signer::import(&[2; 32]).unwrap();
        let root = |can: &'static str| {
            Delegation::builder()
                .audience(&agent)
                .capability(Capability::new(space.did().as_str(), can))
        };
        let uploads = root("upload/*").sign(&space).await.unwrap();
        let info = root("space/info").sign(&space).await.unwrap();
        let identity = ServerIdentity::new(agent.clone(), vec![uploads.clone(), info.clone()]);

        let session = identity.session(&space.did()).unwrap();
        assert_eq!(session.proofs().len(), 2);

        let user = did!("mailto:example.com:alice");
        let both = session
            .delegate(
                &user,
                [Ability::from("space/info"), Ability::from("upload/add")],
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert_eq!(both.proof_cids(), &[uploads.cid(), info.cid()]);
        identity.verifier().unwrap().verify_delegation(&both).await.unwrap();

        let one = session
            .delegate(&user, [Ability::from("space/info")], Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(one.proof_cids(), &[info.cid()]);
    }
}
