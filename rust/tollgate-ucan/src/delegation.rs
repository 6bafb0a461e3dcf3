//! UCAN Delegation
//!
//! A delegation is a signed statement that an issuer grants a set of
//! [`Capability`]s to an audience, optionally backed by proofs (earlier
//! delegations to the issuer). The signed block is the DAG-CBOR encoding of
//! `{ p: payload, s: signature }`; the delegation's CID is computed over
//! that block, and proofs are linked from the payload by CID.

pub mod builder;

use crate::{
    capability::Capability,
    cid::to_dagcbor_cid,
    time::{TimeRange, Timestamp},
};
use ipld_core::{cid::Cid, ipld::Ipld};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::Arc,
};
use tollgate_credentials::{Did, Ed25519Signature, Verifier};

/// Errors from building, encoding or decoding a [`Delegation`].
#[derive(Debug, thiserror::Error)]
pub enum DelegationError {
    /// The builder was not given an audience.
    #[error("delegation has no audience")]
    MissingAudience,

    /// The builder was not given any capabilities.
    #[error("delegation grants no capabilities")]
    NoCapabilities,

    /// Generating the nonce failed.
    #[error("failed to generate nonce: {0}")]
    Nonce(String),

    /// DAG-CBOR encoding failed.
    #[error("failed to encode delegation: {0}")]
    Encoding(String),

    /// DAG-CBOR decoding failed.
    #[error("failed to decode delegation: {0}")]
    Decoding(String),

    /// The issuer failed to sign.
    #[error("failed to sign delegation: {0}")]
    Signing(signature::Error),

    /// The signature bytes are missing or do not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The supplied proofs do not match the `prf` links of the payload.
    #[error("proofs do not match payload links: {0}")]
    ProofMismatch(String),
}

/// The unsigned content of a [`Delegation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationPayload {
    #[serde(rename = "iss")]
    pub(crate) issuer: Did,

    #[serde(rename = "aud")]
    pub(crate) audience: Did,

    #[serde(rename = "att")]
    pub(crate) capabilities: Vec<Capability>,

    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none")]
    pub(crate) expiration: Option<Timestamp>,

    #[serde(rename = "nbf", default, skip_serializing_if = "Option::is_none")]
    pub(crate) not_before: Option<Timestamp>,

    #[serde(rename = "nnc", default, skip_serializing_if = "Option::is_none")]
    pub(crate) nonce: Option<String>,

    #[serde(rename = "fct", default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) facts: Vec<BTreeMap<String, Ipld>>,

    #[serde(rename = "prf", default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) proofs: Vec<Cid>,
}

impl DelegationPayload {
    /// The bytes covered by the issuer's signature.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationError::Encoding`] if the payload cannot be encoded.
    pub fn to_signing_bytes(&self) -> Result<Vec<u8>, DelegationError> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| DelegationError::Encoding(e.to_string()))
    }
}

/// The `prf` links of an encoded envelope, decoded without the rest of
/// the payload.
pub(crate) fn proof_links(block: &[u8]) -> Result<Vec<Cid>, DelegationError> {
    #[derive(Deserialize)]
    struct Links {
        #[serde(rename = "prf", default)]
        proofs: Vec<Cid>,
    }
    #[derive(Deserialize)]
    struct LinksEnvelope {
        p: Links,
    }

    let envelope: LinksEnvelope = serde_ipld_dagcbor::from_slice(block)
        .map_err(|e| DelegationError::Decoding(e.to_string()))?;
    Ok(envelope.p.proofs)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "p")]
    payload: DelegationPayload,

    #[serde(rename = "s", with = "serde_bytes")]
    signature: Vec<u8>,
}

/// Grant or delegate UCAN capabilities to another principal.
///
/// Delegations are immutable: the encoded block and its CID are computed
/// once at construction. Proofs are carried resolved alongside the block,
/// in the order of the payload's `prf` links. Clones share the decoded
/// block, so a proof cited from several places is held once.
#[derive(Clone)]
pub struct Delegation(Arc<Sealed>);

struct Sealed {
    envelope: Envelope,
    block: Vec<u8>,
    cid: Cid,
    proofs: Vec<Delegation>,
}

impl Delegation {
    /// Creates a blank [`DelegationBuilder`][builder::DelegationBuilder] instance.
    #[must_use]
    pub fn builder() -> builder::DelegationBuilder {
        builder::DelegationBuilder::new()
    }

    fn seal(
        payload: DelegationPayload,
        signature: Vec<u8>,
        proofs: Vec<Delegation>,
    ) -> Result<Self, DelegationError> {
        let envelope = Envelope { payload, signature };
        let block = serde_ipld_dagcbor::to_vec(&envelope)
            .map_err(|e| DelegationError::Encoding(e.to_string()))?;
        let cid = to_dagcbor_cid(&block);
        Ok(Self(Arc::new(Sealed {
            envelope,
            block,
            cid,
            proofs,
        })))
    }

    /// Decode a delegation from its block and its already resolved proofs.
    ///
    /// # Errors
    ///
    /// Returns an error if the block is not a delegation envelope, links the
    /// same proof twice, or the proofs are not exactly the ones linked from
    /// the payload.
    pub fn from_block(block: Vec<u8>, proofs: Vec<Delegation>) -> Result<Self, DelegationError> {
        let envelope: Envelope = serde_ipld_dagcbor::from_slice(&block)
            .map_err(|e| DelegationError::Decoding(e.to_string()))?;

        let linked = &envelope.payload.proofs;
        let mut distinct = HashSet::with_capacity(linked.len());
        if let Some(duplicate) = linked.iter().find(|cid| !distinct.insert(**cid)) {
            return Err(DelegationError::ProofMismatch(format!(
                "payload links {duplicate} more than once"
            )));
        }
        let supplied: Vec<Cid> = proofs.iter().map(Delegation::cid).collect();
        if linked != &supplied {
            return Err(DelegationError::ProofMismatch(format!(
                "payload links {} proofs, {} supplied",
                linked.len(),
                supplied.len()
            )));
        }

        let cid = to_dagcbor_cid(&block);
        Ok(Self(Arc::new(Sealed {
            envelope,
            block,
            cid,
            proofs,
        })))
    }

    /// The signed payload.
    #[must_use]
    pub fn payload(&self) -> &DelegationPayload {
        &self.0.envelope.payload
    }

    /// Getter for the `issuer` field.
    #[must_use]
    pub fn issuer(&self) -> &Did {
        &self.payload().issuer
    }

    /// Getter for the `audience` field.
    #[must_use]
    pub fn audience(&self) -> &Did {
        &self.payload().audience
    }

    /// Getter for the `att` field.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.payload().capabilities
    }

    /// Getter for the `expiration` field.
    #[must_use]
    pub fn expiration(&self) -> Option<Timestamp> {
        self.payload().expiration
    }

    /// Getter for the `not_before` field.
    #[must_use]
    pub fn not_before(&self) -> Option<Timestamp> {
        self.payload().not_before
    }

    /// Getter for the `nonce` field.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.payload().nonce.as_deref()
    }

    /// Getter for the `facts` field.
    #[must_use]
    pub fn facts(&self) -> &[BTreeMap<String, Ipld>] {
        &self.payload().facts
    }

    /// CIDs of the proofs, as linked from the payload.
    #[must_use]
    pub fn proof_cids(&self) -> &[Cid] {
        &self.payload().proofs
    }

    /// The resolved proofs, in `prf` order.
    #[must_use]
    pub fn proofs(&self) -> &[Delegation] {
        &self.0.proofs
    }

    /// The raw signature bytes. Empty for absentee (unsigned) delegations.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.0.envelope.signature
    }

    /// Returns `true` if the delegation carries a signature.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        !self.0.envelope.signature.is_empty()
    }

    /// The CID of this delegation's block.
    #[must_use]
    pub fn cid(&self) -> Cid {
        self.0.cid
    }

    /// The DAG-CBOR encoded envelope.
    #[must_use]
    pub fn block(&self) -> &[u8] {
        &self.0.block
    }

    /// The validity window of this delegation alone.
    #[must_use]
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.not_before(), self.expiration())
    }

    /// Search this delegation and its proofs, depth first, for `cid`.
    ///
    /// Each distinct proof is visited once.
    #[must_use]
    pub fn find(&self, cid: &Cid) -> Option<&Delegation> {
        self.find_unvisited(cid, &mut HashSet::new())
    }

    fn find_unvisited<'a>(&'a self, cid: &Cid, seen: &mut HashSet<Cid>) -> Option<&'a Delegation> {
        if &self.0.cid == cid {
            return Some(self);
        }
        if !seen.insert(self.0.cid) {
            return None;
        }
        self.0.proofs.iter().find_map(|proof| proof.find_unvisited(cid, seen))
    }

    /// Verify the signature against a known verifier.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationError::InvalidSignature`] if the delegation is
    /// unsigned or the signature does not verify.
    pub async fn verify_signature<V: Verifier>(&self, verifier: &V) -> Result<(), DelegationError> {
        let signature = Ed25519Signature::from_slice(self.signature())
            .map_err(|e| DelegationError::InvalidSignature(e.to_string()))?;
        let payload = self.payload().to_signing_bytes()?;
        verifier
            .verify(&payload, &signature)
            .await
            .map_err(|e| DelegationError::InvalidSignature(e.to_string()))
    }
}

impl PartialEq for Delegation {
    fn eq(&self, other: &Self) -> bool {
        // content addressed: same CID means same block
        self.0.cid == other.0.cid
    }
}

impl Eq for Delegation {}

impl fmt::Debug for Delegation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegation")
            .field("cid", &self.0.cid.to_string())
            .field("iss", self.issuer())
            .field("aud", self.audience())
            .field("att", &self.capabilities())
            .field("exp", &self.expiration())
            .field("prf", &self.proof_cids().iter().map(Cid::to_string).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_credentials::{Ed25519Signer, Principal};

    fn signer(seed: u8) -> Ed25519Signer {
        Ed25519Signer::import(&[seed; 32]).unwrap()
    }

    #[tokio::test]
    async fn it_decodes_its_own_block() {
        let space = signer(1);
        let agent = signer(2);
        let delegation = Delegation::builder()
            .audience(&agent)
            .capability(Capability::new(space.did().as_str(), "space/*"))
            .expiration(Timestamp::from_unix(2_000_000_000))
            .sign(&space)
            .await
            .unwrap();

        let decoded = Delegation::from_block(delegation.block().to_vec(), vec![]).unwrap();
        assert_eq!(decoded, delegation);
        assert_eq!(decoded.payload(), delegation.payload());
        assert_eq!(decoded.issuer(), &space.did());
        decoded.verify_signature(space.ed25519_did()).await.unwrap();
    }

    #[tokio::test]
    async fn it_rejects_proofs_that_are_not_linked() {
        let space = signer(3);
        let agent = signer(4);
        let root = Delegation::builder()
            .audience(&agent)
            .capability(Capability::new(space.did().as_str(), "space/*"))
            .sign(&space)
            .await
            .unwrap();

        let result = Delegation::from_block(root.block().to_vec(), vec![root.clone()]);
        assert!(matches!(result, Err(DelegationError::ProofMismatch(_))));
    }

    #[tokio::test]
    async fn it_rejects_proofs_linked_twice() {
        let space = signer(7);
        let agent = signer(8);
        let root = Delegation::builder()
            .audience(&agent)
            .capability(Capability::new(space.did().as_str(), "space/*"))
            .sign(&space)
            .await
            .unwrap();

        let mut payload = root.payload().clone();
        payload.issuer = agent.did();
        payload.proofs = vec![root.cid(), root.cid()];
        let block = serde_ipld_dagcbor::to_vec(&Envelope {
            payload,
            signature: Vec::new(),
        })
        .unwrap();

        let result = Delegation::from_block(block, vec![root.clone(), root]);
        assert!(matches!(result, Err(DelegationError::ProofMismatch(_))));
    }

    #[tokio::test]
    async fn it_rejects_signature_from_another_key() {
        let space = signer(5);
        let other = signer(6);
        let delegation = Delegation::builder()
            .audience(&other)
            .capability(Capability::new(space.did().as_str(), "upload/add"))
            .sign(&space)
            .await
            .unwrap();

        let result = delegation.verify_signature(other.ed25519_did()).await;
        assert!(matches!(result, Err(DelegationError::InvalidSignature(_))));
    }
}
