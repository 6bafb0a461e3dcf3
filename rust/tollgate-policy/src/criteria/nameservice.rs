//! Name ownership criterion (`nameservice`).

use super::{CriterionProcessor, parse_criteria};
use crate::{error::CriterionError, input::AuthInput};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Domains {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameCriteria {
    domain: Domains,
    #[serde(default)]
    is_root_domain_only: bool,
}

/// Grants when the requester's claimed name is a configured domain or, unless
/// restricted to the root, a subdomain of one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameOwnership;

#[async_trait]
impl CriterionProcessor for NameOwnership {
    async fn evaluate(
        &self,
        criteria: &serde_json::Value,
        input: &AuthInput,
    ) -> Result<bool, CriterionError> {
        let criteria: NameCriteria = parse_criteria(criteria)?;
        let Some(name) = input.name() else {
            return Ok(false);
        };

        Ok(match (&criteria.domain, criteria.is_root_domain_only) {
            (Domains::One(domain), true) => name == domain,
            // a list cannot name a single root
            (Domains::Many(_), true) => false,
            (Domains::One(domain), false) => owns(name, domain),
            (Domains::Many(domains), false) => domains.iter().any(|domain| owns(name, domain)),
        })
    }
}

fn owns(name: &str, domain: &str) -> bool {
    name == domain
        || name
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::AuthContext;
    use serde_json::json;
    use tollgate_credentials::did;

    fn named(name: &str) -> AuthInput {
        AuthInput::new(did!("key:z6MkAlice")).with_context(AuthContext::default().with_name(name))
    }

    async fn check(criteria: serde_json::Value, input: &AuthInput) -> bool {
        NameOwnership.evaluate(&criteria, input).await.unwrap()
    }

    #[tokio::test]
    async fn it_matches_subdomains() {
        let criteria = json!({ "domain": "example.eth", "isRootDomainOnly": false });
        assert!(check(criteria.clone(), &named("alice.example.eth")).await);
        assert!(check(criteria.clone(), &named("example.eth")).await);
        assert!(!check(criteria, &named("badexample.eth")).await);
    }

    #[tokio::test]
    async fn it_restricts_to_the_root_domain() {
        let criteria = json!({ "domain": "example.eth", "isRootDomainOnly": true });
        assert!(check(criteria.clone(), &named("example.eth")).await);
        assert!(!check(criteria, &named("alice.example.eth")).await);

        let list = json!({ "domain": ["example.eth"], "isRootDomainOnly": true });
        assert!(!check(list, &named("example.eth")).await);
    }

    #[tokio::test]
    async fn it_accepts_any_listed_domain() {
        let criteria = json!({ "domain": ["a.eth", "b.eth"], "isRootDomainOnly": false });
        assert!(check(criteria.clone(), &named("x.b.eth")).await);
        assert!(!check(criteria, &named("c.eth")).await);
    }

    #[tokio::test]
    async fn it_denies_without_a_name() {
        let criteria = json!({ "domain": "example.eth" });
        assert!(!check(criteria, &AuthInput::new(did!("key:z6MkAlice"))).await);
    }
}
