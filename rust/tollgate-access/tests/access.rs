//! Integration tests for authorizing requesters end to end: policy
//! evaluation, delegation issuance and verification of what was issued.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use ipld_core::ipld::Ipld;
use pretty_assertions::assert_eq;
use serde_json::json;
use testresult::TestResult;
use tokio::time::Instant;
use tollgate_access::{
    AccessError, AccessService, Authorization, DEFAULT_ABILITIES, DelegationIssuer, IssueError,
};
use tollgate_credentials::{Did, Ed25519Signer, Principal, did};
use tollgate_policy::{
    AccessPolicy, Attestation, AttestationIndex, AttestationQuery, AuthContext, AuthInput,
    ChainConfig, IndexError, PolicyEvaluator,
};
use tollgate_ucan::{
    ATTEST_ABILITY, Ability, Capability, Delegation, ErrorCode, ServerIdentity, ServiceError,
    SessionBinding, SessionError, Timestamp, TrustAnchor, VerificationError,
};

/// Never finds an attestation.
#[derive(Debug)]
struct EmptyIndex;

#[async_trait]
impl AttestationIndex for EmptyIndex {
    async fn find_attestations(
        &self,
        _: &ChainConfig,
        _: &AttestationQuery,
    ) -> Result<Vec<Attestation>, IndexError> {
        Ok(Vec::new())
    }
}

fn test_signer(seed: u8) -> Ed25519Signer {
    Ed25519Signer::import(&[seed; 32]).expect("32 byte seed")
}

struct Fixture {
    space: Ed25519Signer,
    service: AccessService,
}

/// A service whose agent holds `space/*` and `upload/*` on a fresh space.
async fn fixture() -> TestResult<Fixture> {
    let space = test_signer(11);
    let agent = test_signer(12);
    let root = Delegation::builder()
        .audience(&agent)
        .capability(Capability::new(space.did().as_str(), "space/*"))
        .capability(Capability::new(space.did().as_str(), "upload/*"))
        .sign(&space)
        .await?;

    let issuer = DelegationIssuer::new(ServerIdentity::new(agent, vec![root]), space.did());
    let service = AccessService::new(
        PolicyEvaluator::new(Arc::new(EmptyIndex)),
        issuer,
        TrustAnchor::from(space.ed25519_did().clone()),
    )?;
    Ok(Fixture { space, service })
}

fn allowlist(token_type: &str, claims: &[&str]) -> TestResult<Vec<AccessPolicy>> {
    let value = json!([{
        "criteriaType": "env",
        "criteria": { "whitelistEnvKey": "ALLOWED" },
        "tokenType": token_type,
        "access": { "claims": claims, "metadata": {} }
    }]);
    Ok(AccessPolicy::from_json_slice(&serde_json::to_vec(&value)?)?)
}

fn requester(subject: Did) -> AuthInput {
    let allowed = format!("did:key:z6MkSomeoneElse,{subject}");
    AuthInput::new(subject).with_context(AuthContext::default().with_env("ALLOWED", allowed))
}

#[test_log::test(tokio::test)]
async fn it_issues_a_verifiable_delegation_for_granted_claims() -> TestResult {
    let Fixture { space, service } = fixture().await?;
    let user = did!("mailto:example.com:alice");

    let authorization = service
        .authorize(&allowlist("ucan", &["upload/add", "upload/list"])?, &requester(user.clone()))
        .await?;
    let Authorization::Granted {
        grants,
        delegation: Some(delegation),
    } = authorization
    else {
        panic!("expected a grant with a delegation");
    };
    assert_eq!(grants.len(), 1);

    let verified = service.verify_delegation(delegation.as_bytes()).await?;
    assert_eq!(verified.cid.to_string(), delegation.root());
    assert_eq!(verified.audience, user);
    assert_eq!(
        verified.capabilities,
        vec![
            Capability::new(space.did().as_str(), "upload/add"),
            Capability::new(space.did().as_str(), "upload/list"),
        ]
    );
    assert!(verified.time_range.expires_at().is_some());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_issues_nothing_for_other_token_types() -> TestResult {
    let Fixture { service, .. } = fixture().await?;
    let user = test_signer(13);

    let (grants, archive) = service
        .authorize(&allowlist("storage", &["read"])?, &requester(user.did()))
        .await?
        .into_result()?;

    assert!(grants.get("storage").is_some());
    assert_eq!(archive, None);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_delegates_default_abilities_for_an_empty_ucan_grant() -> TestResult {
    let Fixture { service, .. } = fixture().await?;
    let user = test_signer(13);

    let (_, archive) = service
        .authorize(&allowlist("ucan", &[])?, &requester(user.did()))
        .await?
        .into_result()?;

    let archive = archive.ok_or("ucan grant issues a delegation")?;
    let delegation = Delegation::extract(archive.as_bytes())?;
    let abilities: Vec<&str> = delegation
        .capabilities()
        .iter()
        .map(|capability| capability.can.as_str())
        .collect();
    assert_eq!(abilities, DEFAULT_ABILITIES.to_vec());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_denies_requesters_no_policy_grants() -> TestResult {
    let Fixture { service, .. } = fixture().await?;

    let stranger = AuthInput::new(did!("key:z6MkStranger"))
        .with_context(AuthContext::default().with_env("ALLOWED", "did:key:z6MkSomeoneElse"));
    let authorization = service.authorize(&allowlist("ucan", &["upload/add"])?, &stranger).await?;
    assert_eq!(authorization, Authorization::Denied);

    let empty = service.authorize(&[], &stranger).await?;
    assert!(!empty.is_granted());

    let error: ServiceError = empty.into_result().unwrap_err();
    assert_eq!(error.code, ErrorCode::AccessDenied);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_rejects_issued_delegations_once_expired() -> TestResult {
    let Fixture { service, .. } = fixture().await?;
    let user = did!("mailto:example.com:bob");

    let (_, archive) = service
        .authorize(&allowlist("ucan", &["space/info"])?, &requester(user))
        .await?
        .into_result()?;
    let archive = archive.ok_or("ucan grant issues a delegation")?;
    let delegation = Delegation::extract(archive.as_bytes())?;
    let expiration = delegation.expiration().expect("issued delegations expire");

    let verifier = service.issuer().identity().verifier()?;
    let before = Timestamp::from_unix(expiration.to_unix() - 1);
    verifier.clone().at(before).verify_delegation(&delegation).await?;

    let result = verifier.at(expiration).verify_delegation(&delegation).await;
    assert!(matches!(result, Err(VerificationError::Expired { .. })));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_fails_loudly_for_abilities_the_agent_lacks() -> TestResult {
    let Fixture { service, .. } = fixture().await?;

    let result = service
        .authorize(&allowlist("ucan", &["store/remove"])?, &requester(did!("key:z6MkAlice")))
        .await;
    assert!(matches!(
        result,
        Err(AccessError::Issue(IssueError::Session(SessionError::NotHeld { .. })))
    ));

    let error = ServiceError::from(result.unwrap_err());
    assert_eq!(error.code, ErrorCode::CapabilityNotGranted);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_issues_within_a_deadline() -> TestResult {
    let Fixture { service, .. } = fixture().await?;

    let authorization = service
        .authorize_until(
            &allowlist("ucan", &["upload/add"])?,
            &requester(did!("key:z6MkAlice")),
            Instant::now() + Duration::from_secs(5),
        )
        .await?;
    assert!(authorization.is_granted());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_verifies_sessions_attested_by_the_authority() -> TestResult {
    let Fixture { space, service } = fixture().await?;
    let user = test_signer(14);
    let agent = test_signer(15);

    let proof = Delegation::builder()
        .audience(&agent)
        .capability(Capability::new(space.did().as_str(), Ability::from("upload/*")))
        .sign(&user)
        .await?;
    let attestation = Delegation::builder()
        .audience(&agent)
        .capability(
            Capability::new(space.did().as_str(), ATTEST_ABILITY)
                .with_caveat("proof", Ipld::Link(proof.cid())),
        )
        .sign(&space)
        .await?;

    let binding = SessionBinding {
        agent: agent.did(),
        user: user.did(),
    };
    let session = service
        .verify_session(&binding, &[attestation.clone(), proof.clone()])
        .await?;
    assert_eq!(session.attestation, attestation.cid());
    assert_eq!(session.proof, proof.cid());

    let result = service.verify_session(&binding, &[proof]).await;
    assert!(matches!(
        result,
        Err(AccessError::Verification(VerificationError::AttestationNotFound(_)))
    ));
    Ok(())
}
