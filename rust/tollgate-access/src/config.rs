//! Process configuration for the access service.
//!
//! Everything is read once at startup; a missing or malformed value is a
//! [`ConfigError`] and the service should refuse to start.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tollgate_credentials::{Did, Ed25519Signer, Ed25519Verifier, Principal};
use tollgate_policy::ChainRegistry;
use tollgate_ucan::{Delegation, ServerIdentity, TrustAnchor};

/// Base64 (standard alphabet) Ed25519 seed of the agent.
pub const AGENT_KEY_VAR: &str = "TOLLGATE_AGENT_KEY";
/// Base64 CAR archive of the root proof delegating to the agent.
pub const PROOF_VAR: &str = "TOLLGATE_PROOF";
/// The space delegations are issued over.
pub const SPACE_VAR: &str = "TOLLGATE_SPACE";
/// `did:key` of the authority whose attestations are trusted.
pub const AUTHORITY_VAR: &str = "TOLLGATE_AUTHORITY";
/// Deadline for a single attestation lookup, in milliseconds.
pub const ATTESTATION_TIMEOUT_VAR: &str = "TOLLGATE_ATTESTATION_TIMEOUT_MS";
/// JSON chain registry merged over the default one.
pub const CHAINS_VAR: &str = "TOLLGATE_CHAINS";

const DEFAULT_ATTESTATION_TIMEOUT_MS: u64 = 10_000;

/// Errors from loading an [`AccessConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} is not set")]
    Missing(&'static str),

    /// A variable is set but cannot be used.
    #[error("invalid {var}: {reason}")]
    Invalid {
        /// The offending variable
        var: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.to_string(),
        }
    }
}

/// Raw configuration values, as set in the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    /// Base64 agent seed.
    pub agent_key: String,
    /// Base64 CAR archive of the root proof.
    pub proof: String,
    /// Space DID, if not the root proof's first resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
    /// Attesting authority, if not the root proof's issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    /// Attestation lookup deadline in milliseconds.
    #[serde(default = "default_attestation_timeout_ms")]
    pub attestation_timeout_ms: u64,
    /// Extra or overriding chains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<ChainRegistry>,
}

const fn default_attestation_timeout_ms() -> u64 {
    DEFAULT_ATTESTATION_TIMEOUT_MS
}

impl AccessConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which returns the value of
    /// a variable if it is set.
    ///
    /// # Errors
    ///
    /// See [`from_env`][Self::from_env].
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let set = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let attestation_timeout_ms = match set(ATTESTATION_TIMEOUT_VAR) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ATTESTATION_TIMEOUT_VAR, e))?,
            None => DEFAULT_ATTESTATION_TIMEOUT_MS,
        };
        let chains = set(CHAINS_VAR)
            .map(|value| serde_json::from_str(&value).map_err(|e| ConfigError::invalid(CHAINS_VAR, e)))
            .transpose()?;

        Ok(Self {
            agent_key: set(AGENT_KEY_VAR).ok_or(ConfigError::Missing(AGENT_KEY_VAR))?,
            proof: set(PROOF_VAR).ok_or(ConfigError::Missing(PROOF_VAR))?,
            space: set(SPACE_VAR),
            authority: set(AUTHORITY_VAR),
            attestation_timeout_ms,
            chains,
        })
    }

    /// The agent signer.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not base64 of a 32-byte seed.
    pub fn agent(&self) -> Result<Ed25519Signer, ConfigError> {
        let seed = STANDARD
            .decode(self.agent_key.trim())
            .map_err(|e| ConfigError::invalid(AGENT_KEY_VAR, e))?;
        Ed25519Signer::import(&seed).map_err(|e| ConfigError::invalid(AGENT_KEY_VAR, e))
    }

    /// The root proof.
    ///
    /// # Errors
    ///
    /// Returns an error if the proof is not a base64 delegation archive.
    pub fn root_proof(&self) -> Result<Delegation, ConfigError> {
        let bytes = STANDARD
            .decode(self.proof.trim())
            .map_err(|e| ConfigError::invalid(PROOF_VAR, e))?;
        Delegation::extract(&bytes).map_err(|e| ConfigError::invalid(PROOF_VAR, e))
    }

    /// The agent together with its root proof.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or proof is malformed, or the proof is
    /// not addressed to the agent.
    pub fn server_identity(&self) -> Result<ServerIdentity, ConfigError> {
        let agent = self.agent()?;
        let proof = self.root_proof()?;
        if proof.audience() != &agent.did() {
            return Err(ConfigError::invalid(
                PROOF_VAR,
                format!("proof is addressed to {}, not to {}", proof.audience(), agent.did()),
            ));
        }
        Ok(ServerIdentity::new(agent, vec![proof]))
    }

    /// The space delegations are issued over: the configured one, or the
    /// first resource of the root proof.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured space is not a DID or, when none
    /// is configured, the root proof has no DID resource.
    pub fn space(&self) -> Result<Did, ConfigError> {
        if let Some(space) = &self.space {
            return space.trim().parse().map_err(|e| ConfigError::invalid(SPACE_VAR, e));
        }
        let proof = self.root_proof()?;
        let first = proof
            .capabilities()
            .first()
            .ok_or_else(|| ConfigError::invalid(PROOF_VAR, "proof grants no capabilities"))?;
        first.with.parse().map_err(|e| ConfigError::invalid(SPACE_VAR, e))
    }

    /// The authority whose attestations and root proofs are trusted: the
    /// configured `did:key`, or the root proof's issuer.
    ///
    /// # Errors
    ///
    /// Returns an error if the authority is not a `did:key`.
    pub fn trust_anchor(&self) -> Result<TrustAnchor, ConfigError> {
        let (var, authority) = match &self.authority {
            Some(authority) => (AUTHORITY_VAR, authority.trim().to_string()),
            None => (PROOF_VAR, self.root_proof()?.issuer().to_string()),
        };
        let key: Ed25519Verifier = authority.parse().map_err(|e| ConfigError::invalid(var, e))?;
        Ok(TrustAnchor::from(key))
    }

    /// The default chain registry with the configured chains merged over it.
    #[must_use]
    pub fn chains(&self) -> ChainRegistry {
        match &self.chains {
            Some(chains) => ChainRegistry::default().merge(chains.clone()),
            None => ChainRegistry::default(),
        }
    }

    /// The attestation lookup deadline.
    #[must_use]
    pub const fn attestation_timeout(&self) -> Duration {
        Duration::from_millis(self.attestation_timeout_ms)
    }
}
