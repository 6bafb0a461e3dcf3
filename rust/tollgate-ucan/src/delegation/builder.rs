//! Builder for [`Delegation`]s.

use super::{Delegation, DelegationError, DelegationPayload};
use crate::{capability::Capability, issuer::Issuer, time::Timestamp};
use base64::Engine;
use ipld_core::ipld::Ipld;
use std::collections::BTreeMap;
use tollgate_credentials::{Did, Principal};

/// Number of random bytes in a generated nonce.
const NONCE_LENGTH: usize = 12;

/// Typesafe builder for [`Delegation`].
///
/// The issuer is supplied last: [`sign`][Self::sign] for key holders,
/// [`absentee`][Self::absentee] for principals that cannot sign and rely on
/// an attestation instead.
#[derive(Debug, Clone, Default)]
pub struct DelegationBuilder {
    audience: Option<Did>,
    capabilities: Vec<Capability>,
    expiration: Option<Timestamp>,
    not_before: Option<Timestamp>,
    nonce: Option<String>,
    facts: Vec<BTreeMap<String, Ipld>>,
    proofs: Vec<Delegation>,
}

impl DelegationBuilder {
    /// Creates a blank builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the principal receiving the capabilities.
    #[must_use]
    pub fn audience(mut self, audience: &impl Principal) -> Self {
        self.audience = Some(audience.did());
        self
    }

    /// Adds a capability.
    #[must_use]
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Adds several capabilities, keeping their order.
    #[must_use]
    pub fn capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    /// Sets the `exp` field.
    #[must_use]
    pub const fn expiration(mut self, expiration: Timestamp) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Sets the `nbf` field.
    #[must_use]
    pub const fn not_before(mut self, not_before: Timestamp) -> Self {
        self.not_before = Some(not_before);
        self
    }

    /// Sets an explicit nonce instead of a random one.
    #[must_use]
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Adds a fact.
    #[must_use]
    pub fn fact(mut self, fact: BTreeMap<String, Ipld>) -> Self {
        self.facts.push(fact);
        self
    }

    /// Adds a proof delegation. A proof already added is not linked twice.
    #[must_use]
    pub fn proof(mut self, proof: Delegation) -> Self {
        if !self.proofs.contains(&proof) {
            self.proofs.push(proof);
        }
        self
    }

    /// Adds several proof delegations.
    #[must_use]
    pub fn proofs(self, proofs: impl IntoIterator<Item = Delegation>) -> Self {
        proofs.into_iter().fold(self, Self::proof)
    }

    fn into_payload(self, issuer: Did) -> Result<(DelegationPayload, Vec<Delegation>), DelegationError> {
        let audience = self.audience.ok_or(DelegationError::MissingAudience)?;
        if self.capabilities.is_empty() {
            return Err(DelegationError::NoCapabilities);
        }
        let nonce = match self.nonce {
            Some(nonce) => nonce,
            None => random_nonce()?,
        };

        let payload = DelegationPayload {
            issuer,
            audience,
            capabilities: self.capabilities,
            expiration: self.expiration,
            not_before: self.not_before,
            nonce: Some(nonce),
            facts: self.facts,
            proofs: self.proofs.iter().map(Delegation::cid).collect(),
        };
        Ok((payload, self.proofs))
    }

    /// Build the delegation and sign it with `issuer`'s key.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing, encoding fails or
    /// the issuer fails to sign.
    pub async fn sign<I: Issuer>(self, issuer: &I) -> Result<Delegation, DelegationError> {
        let (payload, proofs) = self.into_payload(issuer.did())?;
        let bytes = payload.to_signing_bytes()?;
        let signature = issuer
            .sign(&bytes)
            .await
            .map_err(DelegationError::Signing)?;
        Delegation::seal(payload, signature.to_bytes().to_vec(), proofs)
    }

    /// Build an unsigned delegation issued by `issuer`.
    ///
    /// Such a delegation is only meaningful together with an attestation
    /// from a trusted authority that vouches for it.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or encoding fails.
    pub fn absentee(self, issuer: Did) -> Result<Delegation, DelegationError> {
        let (payload, proofs) = self.into_payload(issuer)?;
        Delegation::seal(payload, Vec::new(), proofs)
    }
}

fn random_nonce() -> Result<String, DelegationError> {
    let mut bytes = [0u8; NONCE_LENGTH];
    getrandom::getrandom(&mut bytes).map_err(|e| DelegationError::Nonce(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_credentials::{Ed25519Signer, did};

    #[tokio::test]
    async fn it_requires_an_audience() {
        let issuer = Ed25519Signer::import(&[1; 32]).unwrap();
        let result = DelegationBuilder::new()
            .capability(Capability::new("did:web:example.com", "space/info"))
            .sign(&issuer)
            .await;
        assert!(matches!(result, Err(DelegationError::MissingAudience)));
    }

    #[test]
    fn it_requires_capabilities() {
        let result = DelegationBuilder::new()
            .audience(&did!("web:example.com"))
            .absentee(did!("mailto:example.com:alice"));
        assert!(matches!(result, Err(DelegationError::NoCapabilities)));
    }

    #[tokio::test]
    async fn it_generates_fresh_nonces() {
        let issuer = Ed25519Signer::import(&[2; 32]).unwrap();
        let build = || {
            DelegationBuilder::new()
                .audience(&did!("web:example.com"))
                .capability(Capability::new("did:web:example.com", "space/info"))
                .expiration(Timestamp::from_unix(2_000_000_000))
        };
        let a = build().sign(&issuer).await.unwrap();
        let b = build().sign(&issuer).await.unwrap();
        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a.cid(), b.cid());

        let c = build().nonce("fixed").sign(&issuer).await.unwrap();
        let d = build().nonce("fixed").sign(&issuer).await.unwrap();
        assert_eq!(c.cid(), d.cid());
    }

    #[test]
    fn it_links_proofs_by_cid() {
        let alice = did!("mailto:example.com:alice");
        let root = DelegationBuilder::new()
            .audience(&did!("web:example.com"))
            .capability(Capability::new(alice.as_str(), "*"))
            .absentee(alice.clone())
            .unwrap();
        let child = DelegationBuilder::new()
            .audience(&did!("web:other.example.com"))
            .capability(Capability::new(alice.as_str(), "space/info"))
            .proof(root.clone())
            .absentee(did!("web:example.com"))
            .unwrap();

        assert_eq!(child.proof_cids(), &[root.cid()]);
        assert_eq!(child.find(&root.cid()), Some(&root));
        assert!(!child.is_signed());
    }

    #[test]
    fn it_links_a_repeated_proof_once() {
        let alice = did!("mailto:example.com:alice");
        let root = DelegationBuilder::new()
            .audience(&did!("web:example.com"))
            .capability(Capability::new(alice.as_str(), "*"))
            .absentee(alice.clone())
            .unwrap();
        let child = DelegationBuilder::new()
            .audience(&did!("web:other.example.com"))
            .capability(Capability::new(alice.as_str(), "space/info"))
            .proof(root.clone())
            .proofs([root.clone(), root.clone()])
            .absentee(did!("web:example.com"))
            .unwrap();

        assert_eq!(child.proof_cids(), &[root.cid()]);
    }
}
