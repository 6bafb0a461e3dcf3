//! Delegation chain and attestation verification.
//!
//! A [`DelegationVerifier`] is anchored on a [`TrustAnchor`], the root
//! authority whose key is known out of band. It checks:
//! 1. Signatures of every link (anchor key, or the key embedded in a
//!    `did:key` issuer)
//! 2. Time bounds (`nbf <= now < exp`) of every link
//! 3. Principal alignment: each proof is addressed to the issuer of the
//!    delegation that cites it
//! 4. Attenuation: every capability is either issued by the anchor over its
//!    own resource or covered by a capability of a valid proof

use crate::{
    archive::MAX_CHAIN_DEPTH,
    capability::{Ability, Capability},
    delegation::Delegation,
    time::{TimeRange, Timestamp},
};
use ipld_core::{cid::Cid, ipld::Ipld};
use std::collections::{HashMap, HashSet};
use tokio::time::Instant;
use tollgate_credentials::{Did, Ed25519KeyResolver, Ed25519Verifier, Principal, Resolver};

/// The ability an authority uses to vouch for a delegation it did not
/// sign itself.
pub const ATTEST_ABILITY: &str = "ucan/attest";

/// Errors that can occur during verification.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// A signature is missing or does not verify.
    #[error("invalid signature on {cid}: {reason}")]
    InvalidSignature {
        /// The offending delegation
        cid: Cid,
        /// Why verification failed
        reason: String,
    },

    /// The issuer is neither the anchor nor a `did:key`, so its signature
    /// cannot be checked.
    #[error("cannot resolve a key for issuer {0}")]
    UnresolvableIssuer(Did),

    /// A delegation has expired.
    #[error("delegation {cid} expired at {expiration}")]
    Expired {
        /// The expired delegation
        cid: Cid,
        /// Its `exp`
        expiration: Timestamp,
    },

    /// A delegation is not valid yet.
    #[error("delegation {cid} is not valid before {not_before}")]
    NotYetValid {
        /// The premature delegation
        cid: Cid,
        /// Its `nbf`
        not_before: Timestamp,
    },

    /// A delegation is addressed to someone other than expected.
    #[error("audience mismatch: expected {expected}, got {got}")]
    AudienceMismatch {
        /// The expected audience
        expected: Did,
        /// The actual audience
        got: Did,
    },

    /// A delegation is issued by someone other than expected.
    #[error("issuer mismatch: expected {expected}, got {got}")]
    IssuerMismatch {
        /// The expected issuer
        expected: Did,
        /// The actual issuer
        got: Did,
    },

    /// A proof is not addressed to the issuer of the delegation citing it.
    #[error("proof of {cid} is addressed to {got}, not its issuer {expected}")]
    BrokenChain {
        /// The delegation citing the proof
        cid: Cid,
        /// The citing delegation's issuer
        expected: Did,
        /// The proof's audience
        got: Did,
    },

    /// A capability is not backed by the chain.
    #[error("capability {can} on {with} is not granted by any proof")]
    CapabilityNotGranted {
        /// The resource
        with: String,
        /// The ability
        can: Ability,
    },

    /// No attestation from the anchor matches.
    #[error("no attestation from {0} found")]
    AttestationNotFound(Did),

    /// A linked proof is not among the supplied proofs.
    #[error("proof {0} not found")]
    ProofNotFound(Cid),

    /// The proof chain is deeper than allowed.
    #[error("proof chain exceeds {MAX_CHAIN_DEPTH} links")]
    TooDeep,

    /// Verification did not finish before the deadline.
    #[error("verification timed out")]
    Timeout,
}

/// The root authority a verifier trusts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    /// The authority's DID (may be a non-key DID such as `did:web`).
    pub did: Did,
    /// The key the authority signs with.
    pub key: Ed25519Verifier,
}

impl TrustAnchor {
    /// An anchor known by `did` that signs with `key`.
    #[must_use]
    pub const fn new(did: Did, key: Ed25519Verifier) -> Self {
        Self { did, key }
    }
}

impl From<Ed25519Verifier> for TrustAnchor {
    fn from(key: Ed25519Verifier) -> Self {
        Self { did: key.did(), key }
    }
}

/// The principals an attested session is expected to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    /// The agent the user delegated to.
    pub agent: Did,
    /// The user whose authority is attested.
    pub user: Did,
}

/// A successfully verified attestation.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedSession {
    /// The agent bound by the attestation.
    pub agent: Did,
    /// The user bound by the attestation.
    pub user: Did,
    /// CID of the anchor's attestation.
    pub attestation: Cid,
    /// CID of the attested delegation.
    pub proof: Cid,
    /// Capabilities the user delegated to the agent.
    pub capabilities: Vec<Capability>,
    /// Window in which both the attestation and the proof are valid.
    pub time_range: TimeRange,
}

/// A successfully verified delegation chain.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedDelegation {
    /// CID of the verified delegation.
    pub cid: Cid,
    /// Its issuer.
    pub issuer: Did,
    /// Its audience.
    pub audience: Did,
    /// The capabilities it grants, all backed by the chain.
    pub capabilities: Vec<Capability>,
    /// Intersection of the validity windows of every link.
    pub time_range: TimeRange,
}

/// Verifies delegation chains and attestations against a [`TrustAnchor`].
#[derive(Debug, Clone)]
pub struct DelegationVerifier {
    anchor: TrustAnchor,
    now: Option<Timestamp>,
}

impl DelegationVerifier {
    /// A verifier evaluating time bounds against the system clock.
    #[must_use]
    pub const fn new(anchor: TrustAnchor) -> Self {
        Self { anchor, now: None }
    }

    /// Evaluate time bounds at `now` instead of the system clock.
    #[must_use]
    pub const fn at(mut self, now: Timestamp) -> Self {
        self.now = Some(now);
        self
    }

    /// The trusted authority.
    #[must_use]
    pub const fn anchor(&self) -> &TrustAnchor {
        &self.anchor
    }

    fn now(&self) -> Timestamp {
        self.now.unwrap_or_else(Timestamp::now)
    }

    /// Verify that the anchor attests a delegation from `binding.user` to
    /// `binding.agent`, with both found among `proofs`.
    ///
    /// # Errors
    ///
    /// Returns the first broken condition. When several attestations are
    /// candidates, the error of the first one is reported.
    pub async fn verify_attestation(
        &self,
        binding: &SessionBinding,
        proofs: &[Delegation],
    ) -> Result<VerifiedSession, VerificationError> {
        let mut heights = HashMap::new();
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        for proof in proofs {
            chain_height(proof, 0, &mut heights)?;
            walk(proof, &mut seen, &mut all);
        }

        let mut first_error = None;
        for (attestation, cid) in all.iter().filter_map(|d| self.attests(d)) {
            match self.check_attestation(binding, attestation, &cid, &all).await {
                Ok(session) => {
                    tracing::debug!(
                        agent = %session.agent,
                        user = %session.user,
                        attestation = %session.attestation,
                        "verified attestation"
                    );
                    return Ok(session);
                }
                Err(error) => {
                    tracing::debug!(attestation = %attestation.cid(), %error, "attestation rejected");
                    first_error.get_or_insert(error);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| VerificationError::AttestationNotFound(self.anchor.did.clone())))
    }

    /// [`verify_attestation`][Self::verify_attestation] bounded by `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::Timeout`] if the deadline passes first.
    pub async fn verify_attestation_until(
        &self,
        binding: &SessionBinding,
        proofs: &[Delegation],
        deadline: Instant,
    ) -> Result<VerifiedSession, VerificationError> {
        tokio::time::timeout_at(deadline, self.verify_attestation(binding, proofs))
            .await
            .map_err(|_| VerificationError::Timeout)?
    }

    /// Verify `delegation` and its whole proof chain.
    ///
    /// # Errors
    ///
    /// Returns the first broken condition.
    pub async fn verify_delegation(
        &self,
        delegation: &Delegation,
    ) -> Result<VerifiedDelegation, VerificationError> {
        chain_height(delegation, 0, &mut HashMap::new())?;
        let mut chain = Vec::new();
        collect_aligned(delegation, &mut HashSet::new(), &mut chain)?;

        let now = self.now();
        let mut time_range = TimeRange::unbounded();
        for link in &chain {
            self.check_signature(link).await?;
            time_range = time_range.intersect(check_time(link, now)?);
        }

        let mut authorized = HashMap::new();
        for capability in delegation.capabilities() {
            if !self.authorizes(delegation, capability, &mut authorized) {
                return Err(VerificationError::CapabilityNotGranted {
                    with: capability.with.clone(),
                    can: capability.can.clone(),
                });
            }
        }

        tracing::debug!(
            cid = %delegation.cid(),
            issuer = %delegation.issuer(),
            audience = %delegation.audience(),
            links = chain.len(),
            "verified delegation"
        );

        Ok(VerifiedDelegation {
            cid: delegation.cid(),
            issuer: delegation.issuer().clone(),
            audience: delegation.audience().clone(),
            capabilities: delegation.capabilities().to_vec(),
            time_range,
        })
    }

    /// [`verify_delegation`][Self::verify_delegation] bounded by `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::Timeout`] if the deadline passes first.
    pub async fn verify_delegation_until(
        &self,
        delegation: &Delegation,
        deadline: Instant,
    ) -> Result<VerifiedDelegation, VerificationError> {
        tokio::time::timeout_at(deadline, self.verify_delegation(delegation))
            .await
            .map_err(|_| VerificationError::Timeout)?
    }

    /// If `delegation` is an attestation by the anchor, the CID it vouches for.
    fn attests<'a>(&self, delegation: &'a Delegation) -> Option<(&'a Delegation, Cid)> {
        if delegation.issuer() != &self.anchor.did {
            return None;
        }
        delegation.capabilities().iter().find_map(|capability| {
            if capability.with != self.anchor.did.as_str() || capability.can.as_str() != ATTEST_ABILITY {
                return None;
            }
            match capability.caveat("proof") {
                Some(Ipld::Link(cid)) => Some((delegation, *cid)),
                _ => None,
            }
        })
    }

    async fn check_attestation(
        &self,
        binding: &SessionBinding,
        attestation: &Delegation,
        cid: &Cid,
        proofs: &[&Delegation],
    ) -> Result<VerifiedSession, VerificationError> {
        if attestation.audience() != &binding.agent {
            return Err(VerificationError::AudienceMismatch {
                expected: binding.agent.clone(),
                got: attestation.audience().clone(),
            });
        }
        attestation
            .verify_signature(&self.anchor.key)
            .await
            .map_err(|e| VerificationError::InvalidSignature {
                cid: attestation.cid(),
                reason: e.to_string(),
            })?;
        let now = self.now();
        let attested_range = check_time(attestation, now)?;

        let proof = proofs
            .iter()
            .copied()
            .find(|d| d.cid() == *cid)
            .ok_or(VerificationError::ProofNotFound(*cid))?;
        if proof.issuer() != &binding.user {
            return Err(VerificationError::IssuerMismatch {
                expected: binding.user.clone(),
                got: proof.issuer().clone(),
            });
        }
        if proof.audience() != &binding.agent {
            return Err(VerificationError::AudienceMismatch {
                expected: binding.agent.clone(),
                got: proof.audience().clone(),
            });
        }
        let proof_range = check_time(proof, now)?;
        if proof.issuer().is_key() {
            self.check_signature(proof).await?;
        }

        Ok(VerifiedSession {
            agent: binding.agent.clone(),
            user: binding.user.clone(),
            attestation: attestation.cid(),
            proof: proof.cid(),
            capabilities: proof.capabilities().to_vec(),
            time_range: attested_range.intersect(proof_range),
        })
    }

    async fn check_signature(&self, delegation: &Delegation) -> Result<(), VerificationError> {
        let issuer = delegation.issuer();
        let result = if issuer == &self.anchor.did {
            delegation.verify_signature(&self.anchor.key).await
        } else if issuer.is_key() {
            let key = Ed25519KeyResolver.resolve(issuer).map_err(|e| {
                VerificationError::InvalidSignature {
                    cid: delegation.cid(),
                    reason: e.to_string(),
                }
            })?;
            delegation.verify_signature(&key).await
        } else {
            return Err(VerificationError::UnresolvableIssuer(issuer.clone()));
        };
        result.map_err(|e| VerificationError::InvalidSignature {
            cid: delegation.cid(),
            reason: e.to_string(),
        })
    }

    /// Whether `capability` of `delegation` traces back to the anchor.
    ///
    /// `authorized` remembers the outcome for each proof capability, keyed
    /// by the proof's CID and the capability's index in it.
    fn authorizes(
        &self,
        delegation: &Delegation,
        capability: &Capability,
        authorized: &mut HashMap<(Cid, usize), bool>,
    ) -> bool {
        if delegation.issuer() == &self.anchor.did && capability.with == self.anchor.did.as_str() {
            return true;
        }
        for proof in delegation.proofs() {
            for (index, held) in proof.capabilities().iter().enumerate() {
                if !held.covers(capability) {
                    continue;
                }
                let key = (proof.cid(), index);
                let granted = match authorized.get(&key) {
                    Some(granted) => *granted,
                    None => {
                        let granted = self.authorizes(proof, held, authorized);
                        authorized.insert(key, granted);
                        granted
                    }
                };
                if granted {
                    return true;
                }
            }
        }
        false
    }
}

fn check_time(delegation: &Delegation, now: Timestamp) -> Result<TimeRange, VerificationError> {
    if let Some(not_before) = delegation.not_before() {
        if now < not_before {
            return Err(VerificationError::NotYetValid {
                cid: delegation.cid(),
                not_before,
            });
        }
    }
    if let Some(expiration) = delegation.expiration() {
        if now >= expiration {
            return Err(VerificationError::Expired {
                cid: delegation.cid(),
                expiration,
            });
        }
    }
    Ok(delegation.time_range())
}

/// The number of links below `delegation`, reached `depth` links below the
/// root. Fails once a chain runs past [`MAX_CHAIN_DEPTH`].
fn chain_height(
    delegation: &Delegation,
    depth: usize,
    heights: &mut HashMap<Cid, usize>,
) -> Result<usize, VerificationError> {
    if depth > MAX_CHAIN_DEPTH {
        return Err(VerificationError::TooDeep);
    }
    let height = match heights.get(&delegation.cid()) {
        Some(height) => *height,
        None => {
            let mut height = 0;
            for proof in delegation.proofs() {
                height = height.max(chain_height(proof, depth + 1, heights)? + 1);
            }
            heights.insert(delegation.cid(), height);
            height
        }
    };
    if depth + height > MAX_CHAIN_DEPTH {
        return Err(VerificationError::TooDeep);
    }
    Ok(height)
}

/// Every distinct delegation reachable from `delegation`, in first-visit
/// order. The chain height must already be bounded.
fn walk<'a>(delegation: &'a Delegation, seen: &mut HashSet<Cid>, out: &mut Vec<&'a Delegation>) {
    if !seen.insert(delegation.cid()) {
        return;
    }
    out.push(delegation);
    for proof in delegation.proofs() {
        walk(proof, seen, out);
    }
}

/// Like [`walk`], also checking that every proof is addressed to the
/// issuer citing it.
fn collect_aligned<'a>(
    delegation: &'a Delegation,
    seen: &mut HashSet<Cid>,
    out: &mut Vec<&'a Delegation>,
) -> Result<(), VerificationError> {
    if !seen.insert(delegation.cid()) {
        return Ok(());
    }
    out.push(delegation);
    for proof in delegation.proofs() {
        if proof.audience() != delegation.issuer() {
            return Err(VerificationError::BrokenChain {
                cid: delegation.cid(),
                expected: delegation.issuer().clone(),
                got: proof.audience().clone(),
            });
        }
        collect_aligned(proof, seen, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_credentials::{Ed25519Signer, did};

    fn signer(seed: u8) -> Ed25519Signer {
        Ed25519Signer::import(&[seed; 32]).unwrap()
    }

    /// An authority known by a `did:web` that signs with an Ed25519 key.
    struct WebAuthority {
        did: Did,
        key: Ed25519Signer,
    }

    impl Principal for WebAuthority {
        fn did(&self) -> Did {
            self.did.clone()
        }
    }

    impl tollgate_credentials::Signer for WebAuthority {
        async fn sign(
            &self,
            payload: &[u8],
        ) -> Result<tollgate_credentials::Ed25519Signature, signature::Error> {
            self.key.sign(payload).await
        }
    }

    fn attest(authority: &Did, cid: Cid) -> Capability {
        Capability::new(authority.as_str(), ATTEST_ABILITY).with_caveat("proof", Ipld::Link(cid))
    }

    #[tokio::test]
    async fn it_accepts_a_chain_rooted_at_the_anchor() {
        let space = signer(1);
        let agent = signer(2);
        let user = signer(3);
        let root = Delegation::builder()
            .audience(&agent)
            .capability(Capability::new(space.did().as_str(), "*"))
            .sign(&space)
            .await
            .unwrap();
        let child = Delegation::builder()
            .audience(&user)
            .capability(Capability::new(space.did().as_str(), "upload/add"))
            .expiration(Timestamp::from_unix(2_000))
            .proof(root)
            .sign(&agent)
            .await
            .unwrap();

        let verifier = DelegationVerifier::new(TrustAnchor::from(*space.ed25519_did()))
            .at(Timestamp::from_unix(1_000));
        let verified = verifier.verify_delegation(&child).await.unwrap();
        assert_eq!(verified.audience, user.did());
        assert_eq!(verified.time_range.expires_at(), Some(Timestamp::from_unix(2_000)));
    }

    #[tokio::test]
    async fn it_rejects_capabilities_outside_the_proof() {
        let space = signer(4);
        let agent = signer(5);
        let root = Delegation::builder()
            .audience(&agent)
            .capability(Capability::new(space.did().as_str(), "upload/*"))
            .sign(&space)
            .await
            .unwrap();
        let child = Delegation::builder()
            .audience(&did!("mailto:example.com:alice"))
            .capability(Capability::new(space.did().as_str(), "space/info"))
            .proof(root)
            .sign(&agent)
            .await
            .unwrap();

        let verifier = DelegationVerifier::new(TrustAnchor::from(*space.ed25519_did()));
        let result = verifier.verify_delegation(&child).await;
        assert!(matches!(result, Err(VerificationError::CapabilityNotGranted { .. })));
    }

    #[tokio::test]
    async fn it_rejects_misaligned_proofs() {
        let space = signer(6);
        let agent = signer(7);
        let stranger = signer(8);
        let root = Delegation::builder()
            .audience(&stranger)
            .capability(Capability::new(space.did().as_str(), "*"))
            .sign(&space)
            .await
            .unwrap();
        let child = Delegation::builder()
            .audience(&did!("web:example.com"))
            .capability(Capability::new(space.did().as_str(), "upload/add"))
            .proof(root)
            .sign(&agent)
            .await
            .unwrap();

        let verifier = DelegationVerifier::new(TrustAnchor::from(*space.ed25519_did()));
        let result = verifier.verify_delegation(&child).await;
        assert!(matches!(result, Err(VerificationError::BrokenChain { .. })));
    }

    #[tokio::test]
    async fn it_verifies_an_attested_absentee_delegation() {
        let authority_key = signer(9);
        let authority = did!("web:auth.example.com");
        let agent = signer(10);
        let user = did!("mailto:example.com:alice");

        let proof = Delegation::builder()
            .audience(&agent)
            .capability(Capability::new(user.as_str(), "*"))
            .absentee(user.clone())
            .unwrap();

        let issuer = WebAuthority {
            did: authority.clone(),
            key: authority_key.clone(),
        };
        let attestation = Delegation::builder()
            .audience(&agent)
            .capability(attest(&authority, proof.cid()))
            .sign(&issuer)
            .await
            .unwrap();

        let verifier = DelegationVerifier::new(TrustAnchor::new(
            authority.clone(),
            *authority_key.ed25519_did(),
        ));
        let binding = SessionBinding {
            agent: agent.did(),
            user: user.clone(),
        };
        let session = verifier
            .verify_attestation(&binding, &[attestation.clone(), proof.clone()])
            .await
            .unwrap();
        assert_eq!(session.proof, proof.cid());
        assert_eq!(session.attestation, attestation.cid());

        let wrong = SessionBinding {
            agent: agent.did(),
            user: did!("mailto:example.com:mallory"),
        };
        let result = verifier.verify_attestation(&wrong, &[attestation, proof]).await;
        assert!(matches!(result, Err(VerificationError::IssuerMismatch { .. })));
    }

    #[tokio::test]
    async fn it_reports_missing_attestations() {
        let authority = signer(11);
        let verifier = DelegationVerifier::new(TrustAnchor::from(*authority.ed25519_did()));
        let binding = SessionBinding {
            agent: signer(12).did(),
            user: did!("mailto:example.com:alice"),
        };
        let result = verifier.verify_attestation(&binding, &[]).await;
        assert!(matches!(result, Err(VerificationError::AttestationNotFound(_))));
    }
}
