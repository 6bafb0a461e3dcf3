//! Capabilities: an ability exercised on a resource.

use ipld_core::ipld::Ipld;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// An opaque ability name such as `upload/add`.
///
/// Abilities are `/`-separated paths. Matching follows the UCAN rules:
/// `*` covers every ability, `ns/*` covers every ability under `ns/`,
/// anything else must match exactly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ability(String);

impl Ability {
    /// The ability string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if holding `self` implies holding `other`.
    #[must_use]
    pub fn covers(&self, other: &Ability) -> bool {
        if self.0 == "*" || self.0 == other.0 {
            return true;
        }
        match self.0.strip_suffix("/*") {
            Some(namespace) => other
                .0
                .strip_prefix(namespace)
                .is_some_and(|rest| rest.starts_with('/')),
            None => false,
        }
    }
}

impl From<&str> for Ability {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Ability {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ability on a resource, with optional caveats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// The resource the ability applies to (a space DID).
    pub with: String,

    /// The ability granted.
    pub can: Ability,

    /// Caveats narrowing the capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nb: Option<BTreeMap<String, Ipld>>,
}

impl Capability {
    /// A capability without caveats.
    pub fn new(with: impl Into<String>, can: impl Into<Ability>) -> Self {
        Self {
            with: with.into(),
            can: can.into(),
            nb: None,
        }
    }

    /// Attach a caveat.
    #[must_use]
    pub fn with_caveat(mut self, key: impl Into<String>, value: Ipld) -> Self {
        self.nb.get_or_insert_with(BTreeMap::new).insert(key.into(), value);
        self
    }

    /// Look up a caveat by name.
    #[must_use]
    pub fn caveat(&self, key: &str) -> Option<&Ipld> {
        self.nb.as_ref().and_then(|nb| nb.get(key))
    }

    /// Returns `true` if `self` grants at least what `other` asks for.
    ///
    /// Caveats are not compared.
    #[must_use]
    pub fn covers(&self, other: &Capability) -> bool {
        self.with == other.with && self.can.covers(&other.can)
    }
}
