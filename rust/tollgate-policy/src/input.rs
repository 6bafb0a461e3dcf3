//! The requester identity and context a policy is evaluated against.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tollgate_credentials::Did;

/// Who is asking, and what they brought along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthInput {
    /// The requester.
    pub subject: Did,

    /// Request context consulted by some criteria.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<AuthContext>,

    /// The resource the request is about, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl AuthInput {
    /// An input carrying only a subject.
    #[must_use]
    pub const fn new(subject: Did) -> Self {
        Self {
            subject,
            context: None,
            resource: None,
        }
    }

    /// Attach a context.
    #[must_use]
    pub fn with_context(mut self, context: AuthContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Attach a resource.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Look up an environment entry from the context.
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.context
            .as_ref()
            .and_then(|context| context.env.get(key))
            .map(String::as_str)
    }

    /// The name the requester claims to own.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.context.as_ref().and_then(|context| context.name.as_deref())
    }
}

/// Request context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Environment entries, such as allowlists.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// A name (e.g. an ENS domain) the requester claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Any other context keys, preserved as given.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AuthContext {
    /// Add an environment entry.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the claimed name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tollgate_credentials::did;

    #[test]
    fn it_keeps_unknown_context_keys() {
        let input: AuthInput = serde_json::from_str(
            r#"{
                "subject": "did:key:z6MkAlice",
                "context": { "env": { "ALLOW": "a,b" }, "name": "alice.eth", "ip": "10.0.0.1" }
            }"#,
        )
        .unwrap();

        assert_eq!(input.subject, did!("key:z6MkAlice"));
        assert_eq!(input.env("ALLOW"), Some("a,b"));
        assert_eq!(input.name(), Some("alice.eth"));
        let context = input.context.unwrap();
        assert_eq!(context.extra.get("ip"), Some(&serde_json::json!("10.0.0.1")));
    }

    #[test]
    fn it_reads_nothing_without_context() {
        let input = AuthInput::new(did!("key:z6MkAlice"));
        assert_eq!(input.env("ALLOW"), None);
        assert_eq!(input.name(), None);
    }
}
