//! Aggregated grants, keyed by token type.

use crate::policy::{Access, AccessPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The outcome of evaluating a policy list: for each token type, the access
/// of the last policy that granted it.
///
/// Iteration is ordered by token type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantMap(BTreeMap<String, Access>);

impl GrantMap {
    /// An empty map: nothing granted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `(policy, granted)` outcomes in order.
    ///
    /// A granting policy replaces whatever an earlier policy granted for the
    /// same token type; claims are never merged.
    pub fn aggregate<'a>(outcomes: impl IntoIterator<Item = (&'a AccessPolicy, bool)>) -> Self {
        outcomes
            .into_iter()
            .filter(|(_, granted)| *granted)
            .fold(Self::new(), |grants, (policy, _)| {
                grants.with_grant(policy.token_type.clone(), policy.access.clone())
            })
    }

    /// Set the access for `token_type`, replacing any previous entry.
    #[must_use]
    pub fn with_grant(mut self, token_type: impl Into<String>, access: Access) -> Self {
        self.0.insert(token_type.into(), access);
        self
    }

    /// The access granted for `token_type`.
    #[must_use]
    pub fn get(&self, token_type: &str) -> Option<&Access> {
        self.0.get(token_type)
    }

    /// Returns `true` if nothing was granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of granted token types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Granted token types and their access, ordered by token type.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Access)> {
        self.0.iter().map(|(token_type, access)| (token_type.as_str(), access))
    }
}

impl IntoIterator for GrantMap {
    type Item = (String, Access);
    type IntoIter = std::collections::btree_map::IntoIter<String, Access>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
