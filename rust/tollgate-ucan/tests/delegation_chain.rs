//! Integration tests for issuing, archiving and verifying delegation chains.
//!
//! These tests use real Ed25519 keys: a space key delegates to the server
//! agent, which delegates onwards to a user through a session.

use std::time::Duration;

use pretty_assertions::assert_eq;
use testresult::TestResult;
use tollgate_credentials::{Ed25519Signer, Principal, did};
use tollgate_ucan::{
    Ability, ArchiveError, Capability, Delegation, DelegationArchive, DelegationVerifier,
    ErrorCode, MAX_CHAIN_DEPTH, ServerIdentity, ServiceError, Timestamp, TrustAnchor,
    VerificationError,
};

/// Create a test signer from a seed byte (for deterministic tests).
fn test_signer(seed: u8) -> Ed25519Signer {
    let mut key_bytes = [0u8; 32];
    key_bytes[0] = seed;
    Ed25519Signer::import(&key_bytes).expect("32 byte seed")
}

/// A server identity holding `space/*` and `upload/*` on a fresh space.
async fn server_identity() -> TestResult<(Ed25519Signer, ServerIdentity)> {
    let space = test_signer(1);
    let agent = test_signer(2);
    let root = Delegation::builder()
        .audience(&agent)
        .capability(Capability::new(space.did().as_str(), "space/*"))
        .capability(Capability::new(space.did().as_str(), "upload/*"))
        .sign(&space)
        .await?;
    Ok((space, ServerIdentity::new(agent, vec![root])))
}

#[test_log::test(tokio::test)]
async fn it_verifies_an_issued_delegation_after_archiving() -> TestResult {
    let (space, identity) = server_identity().await?;
    let user = did!("mailto:example.com:alice");

    let delegation = identity
        .session(&space.did())?
        .delegate(
            &user,
            [Ability::from("space/info"), Ability::from("upload/add")],
            Duration::from_secs(24 * 60 * 60),
        )
        .await?;

    let archive = delegation.archive()?;
    let restored = DelegationArchive::from_bytes(archive.clone().into_bytes())?;
    assert_eq!(restored.root(), delegation.cid().to_string());

    let extracted = restored.extract()?;
    assert_eq!(extracted, delegation);
    assert_eq!(extracted.proofs().len(), 1);

    let verified = identity.verifier()?.verify_delegation(&extracted).await?;
    assert_eq!(verified.issuer, identity.agent().did());
    assert_eq!(verified.audience, user);
    assert_eq!(
        verified
            .capabilities
            .iter()
            .map(|c| c.can.as_str())
            .collect::<Vec<_>>(),
        vec!["space/info", "upload/add"]
    );
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_rejects_a_delegation_after_it_expires() -> TestResult {
    let (space, identity) = server_identity().await?;
    let lifetime = Duration::from_secs(60);
    let delegation = identity
        .session(&space.did())?
        .delegate(&did!("mailto:example.com:bob"), [Ability::from("upload/list")], lifetime)
        .await?;

    let expiration = delegation.expiration().ok_or("expiration is set")?;
    let verifier = identity.verifier()?;

    verifier
        .clone()
        .at(Timestamp::from_unix(expiration.to_unix() - 1))
        .verify_delegation(&delegation)
        .await?;

    let result = verifier.at(expiration).verify_delegation(&delegation).await;
    let Err(error) = result else {
        return Err("delegation should have expired".into());
    };
    assert!(matches!(error, VerificationError::Expired { .. }));
    assert_eq!(ServiceError::from(error).code, ErrorCode::DelegationExpired);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_rejects_a_chain_signed_by_an_impostor() -> TestResult {
    let (space, identity) = server_identity().await?;
    let impostor = test_signer(9);

    // impostor claims to hold the space through the agent's root proof
    let forged = Delegation::builder()
        .audience(&did!("mailto:example.com:eve"))
        .capability(Capability::new(space.did().as_str(), "upload/add"))
        .proof(identity.proofs()[0].clone())
        .sign(&impostor)
        .await?;

    let result = identity.verifier()?.verify_delegation(&forged).await;
    assert!(matches!(result, Err(VerificationError::BrokenChain { .. })));
    Ok(())
}

/// A delegation from `hub` to a user over `levels + 1` layers of proof pairs,
/// where both members of each pair cite both members of the pair below.
async fn diamond(space: &Ed25519Signer, hub: &Ed25519Signer, levels: usize) -> TestResult<Delegation> {
    let root = || {
        Delegation::builder()
            .audience(hub)
            .capability(Capability::new(space.did().as_str(), "*"))
    };
    let mut pair = (root().sign(space).await?, root().sign(space).await?);

    for _ in 0..levels {
        let layer = || {
            Delegation::builder()
                .audience(hub)
                .capability(Capability::new(space.did().as_str(), "upload/add"))
                .proofs([pair.0.clone(), pair.1.clone()])
        };
        pair = (layer().sign(hub).await?, layer().sign(hub).await?);
    }

    Ok(Delegation::builder()
        .audience(&did!("mailto:example.com:alice"))
        .capability(Capability::new(space.did().as_str(), "upload/add"))
        .proofs([pair.0, pair.1])
        .sign(hub)
        .await?)
}

#[test_log::test(tokio::test)]
async fn it_extracts_and_verifies_shared_proofs_once() -> TestResult {
    let space = test_signer(20);
    let hub = test_signer(21);
    let delegation = diamond(&space, &hub, 30).await?;

    let archive = delegation.archive()?;
    let extracted = Delegation::extract(archive.as_bytes())?;
    assert_eq!(extracted, delegation);

    let verifier = DelegationVerifier::new(TrustAnchor::from(*space.ed25519_did()));
    let verified = verifier.verify_delegation(&extracted).await?;
    assert_eq!(verified.issuer, hub.did());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_rejects_shared_proofs_past_the_depth_limit() -> TestResult {
    let space = test_signer(22);
    let hub = test_signer(23);
    let delegation = diamond(&space, &hub, MAX_CHAIN_DEPTH).await?;

    let archive = delegation.archive()?;
    assert!(matches!(
        Delegation::extract(archive.as_bytes()),
        Err(ArchiveError::TooDeep)
    ));

    let verifier = DelegationVerifier::new(TrustAnchor::from(*space.ed25519_did()));
    let result = verifier.verify_delegation(&delegation).await;
    assert!(matches!(result, Err(VerificationError::TooDeep)));
    Ok(())
}
