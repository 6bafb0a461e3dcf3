//! Chains with an attestation service deployment.

use crate::error::CriterionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where to find attestations on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    /// Address of the attestation contract.
    pub attestation_contract: String,
    /// GraphQL endpoint of the attestation indexer.
    pub graphql_endpoint: String,
}

impl ChainConfig {
    /// A chain configuration.
    pub fn new(attestation_contract: impl Into<String>, graphql_endpoint: impl Into<String>) -> Self {
        Self {
            attestation_contract: attestation_contract.into(),
            graphql_endpoint: graphql_endpoint.into(),
        }
    }
}

/// Known chains, by numeric chain id.
///
/// Unknown ids are rejected rather than defaulted to some chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainRegistry(BTreeMap<u64, ChainConfig>);

impl Default for ChainRegistry {
    /// The public attestation service deployments.
    fn default() -> Self {
        Self::empty()
            .with_chain(
                1,
                ChainConfig::new(
                    "0xA1207F3BBa224E2c9c3c6D5aF63D0eb1582Ce587",
                    "https://easscan.org/graphql",
                ),
            )
            .with_chain(
                10,
                ChainConfig::new(
                    "0x4200000000000000000000000000000000000021",
                    "https://optimism.easscan.org/graphql",
                ),
            )
            .with_chain(
                8453,
                ChainConfig::new(
                    "0x4200000000000000000000000000000000000021",
                    "https://base.easscan.org/graphql",
                ),
            )
            .with_chain(
                42161,
                ChainConfig::new(
                    "0xbD75f629A22Dc1ceD33dDA0b68c546A1c035c458",
                    "https://arbitrum.easscan.org/graphql",
                ),
            )
            .with_chain(
                11_155_111,
                ChainConfig::new(
                    "0xC2679fBD37d54388Ce493F1DB75320D236e1815e",
                    "https://sepolia.easscan.org/graphql",
                ),
            )
    }
}

impl ChainRegistry {
    /// A registry with no chains.
    #[must_use]
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Add or replace a chain.
    #[must_use]
    pub fn with_chain(mut self, chain_id: u64, config: ChainConfig) -> Self {
        self.0.insert(chain_id, config);
        self
    }

    /// Add or replace every chain of `other`.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.0.extend(other.0);
        self
    }

    /// The configuration for `chain_id`.
    #[must_use]
    pub fn get(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.0.get(&chain_id)
    }

    /// Known chain ids, ascending.
    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.keys().copied()
    }

    /// Resolve a chain id given as a decimal string.
    ///
    /// # Errors
    ///
    /// Returns [`CriterionError::Configuration`] if the id does not parse or
    /// is not registered.
    pub fn resolve(&self, chain_id: &str) -> Result<&ChainConfig, CriterionError> {
        let id: u64 = chain_id
            .trim()
            .parse()
            .map_err(|_| CriterionError::Configuration(format!("invalid chain id {chain_id:?}")))?;
        self.get(id)
            .ok_or_else(|| CriterionError::Configuration(format!("unknown chain id {id}")))
    }
}
