//! Access policy records.

use crate::error::PolicyError;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of trust criterion a policy uses.
///
/// Unrecognized kinds are preserved so that a policy list written for a newer
/// deployment still loads; the evaluator skips them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CriteriaKind {
    /// Subject listed in an environment allowlist.
    Env,
    /// Subject named by an on-chain attestation.
    Eas,
    /// Requester owns a name under a configured domain.
    Nameservice,
    /// Any other criteria type.
    Other(String),
}

impl CriteriaKind {
    /// The wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Env => "env",
            Self::Eas => "eas",
            Self::Nameservice => "nameservice",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for CriteriaKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "env" => Self::Env,
            "eas" => Self::Eas,
            "nameservice" => Self::Nameservice,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for CriteriaKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<CriteriaKind> for String {
    fn from(kind: CriteriaKind) -> Self {
        match kind {
            CriteriaKind::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for CriteriaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a granting policy hands out for its token type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Access {
    /// Claims (abilities) in the order they were configured, deduplicated.
    #[serde(default)]
    pub claims: IndexSet<String>,

    /// Free-form metadata passed through to the caller.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Access {
    /// Access with the given claims and no metadata.
    pub fn with_claims<I, S>(claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            claims: claims.into_iter().map(Into::into).collect(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// A declarative policy: if the criterion holds, `access` is granted for
/// `token_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicy {
    /// Which criterion processor decides this policy.
    pub criteria_type: CriteriaKind,

    /// Criterion parameters, interpreted by the processor.
    #[serde(default)]
    pub criteria: serde_json::Value,

    /// The token type granted (e.g. `ucan`).
    pub token_type: String,

    /// What is granted.
    #[serde(default)]
    pub access: Access,
}

impl AccessPolicy {
    /// A policy granting `access` for `token_type` when `criteria` holds.
    pub fn new(
        criteria_type: impl Into<CriteriaKind>,
        criteria: serde_json::Value,
        token_type: impl Into<String>,
        access: Access,
    ) -> Self {
        Self {
            criteria_type: criteria_type.into(),
            criteria,
            token_type: token_type.into(),
            access,
        }
    }

    /// Parse a JSON array of policies.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Malformed`] if the bytes are not a JSON array
    /// of policy records.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Vec<Self>, PolicyError> {
        serde_json::from_slice(bytes).map_err(|e| PolicyError::Malformed(e.to_string()))
    }
}
