//! Concurrent policy evaluation.

use crate::{
    criteria::{
        CriterionProcessor,
        eas::{AttestationLookup, chain::ChainRegistry, index::AttestationIndex},
        env::EnvAllowlist,
        nameservice::NameOwnership,
    },
    error::CriterionError,
    grant::GrantMap,
    input::AuthInput,
    policy::{AccessPolicy, CriteriaKind},
};
use futures::future::join_all;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long [`PolicyEvaluator::evaluate`] waits for criteria by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Evaluates policy lists into a [`GrantMap`].
///
/// Processors are registered per [`CriteriaKind`] at construction. Every
/// policy is checked concurrently; a policy whose kind has no processor, whose
/// processor fails, or that misses the deadline is treated as denied.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    processors: HashMap<CriteriaKind, Arc<dyn CriterionProcessor>>,
    timeout: Duration,
}

impl PolicyEvaluator {
    /// An evaluator with the `env`, `eas` and `nameservice` processors, using
    /// `index` for attestations on the default chains.
    #[must_use]
    pub fn new(index: Arc<dyn AttestationIndex>) -> Self {
        Self::builder().defaults(index, ChainRegistry::default()).build()
    }

    /// An empty builder.
    #[must_use]
    pub fn builder() -> PolicyEvaluatorBuilder {
        PolicyEvaluatorBuilder::default()
    }

    /// The deadline applied by [`evaluate`][Self::evaluate].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Evaluate `policies` against `input` within the configured timeout.
    pub async fn evaluate(&self, policies: &[AccessPolicy], input: &AuthInput) -> GrantMap {
        self.evaluate_until(policies, input, Instant::now() + self.timeout)
            .await
    }

    /// Evaluate `policies` against `input`, giving up on any criterion still
    /// running at `deadline`.
    ///
    /// Grants are folded in the order of `policies`: a later granting policy
    /// replaces an earlier one for the same token type.
    pub async fn evaluate_until(
        &self,
        policies: &[AccessPolicy],
        input: &AuthInput,
        deadline: Instant,
    ) -> GrantMap {
        let outcomes = join_all(
            policies
                .iter()
                .map(|policy| self.check(policy, input, deadline)),
        )
        .await;

        GrantMap::aggregate(policies.iter().zip(outcomes))
    }

    async fn check(&self, policy: &AccessPolicy, input: &AuthInput, deadline: Instant) -> bool {
        let Some(processor) = self.processors.get(&policy.criteria_type) else {
            debug!(
                criteria = %policy.criteria_type,
                token_type = %policy.token_type,
                "skipping policy with unknown criteria type"
            );
            return false;
        };

        let result = tokio::time::timeout_at(deadline, processor.evaluate(&policy.criteria, input))
            .await
            .unwrap_or(Err(CriterionError::Timeout));

        match result {
            Ok(granted) => {
                debug!(
                    criteria = %policy.criteria_type,
                    token_type = %policy.token_type,
                    subject = %input.subject,
                    granted,
                    "evaluated policy"
                );
                granted
            }
            Err(error) => {
                warn!(
                    criteria = %policy.criteria_type,
                    token_type = %policy.token_type,
                    subject = %input.subject,
                    %error,
                    "criterion failed; denying"
                );
                false
            }
        }
    }
}

/// Builder for [`PolicyEvaluator`].
#[derive(Debug, Clone)]
pub struct PolicyEvaluatorBuilder {
    processors: HashMap<CriteriaKind, Arc<dyn CriterionProcessor>>,
    timeout: Duration,
}

impl Default for PolicyEvaluatorBuilder {
    fn default() -> Self {
        Self {
            processors: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PolicyEvaluatorBuilder {
    /// Register the `env`, `eas` and `nameservice` processors.
    #[must_use]
    pub fn defaults(self, index: Arc<dyn AttestationIndex>, chains: ChainRegistry) -> Self {
        self.processor(CriteriaKind::Env, Arc::new(EnvAllowlist))
            .processor(CriteriaKind::Nameservice, Arc::new(NameOwnership))
            .processor(
                CriteriaKind::Eas,
                Arc::new(AttestationLookup::new(index, chains)),
            )
    }

    /// Register `processor` for `kind`, replacing any previous one.
    #[must_use]
    pub fn processor(mut self, kind: CriteriaKind, processor: Arc<dyn CriterionProcessor>) -> Self {
        self.processors.insert(kind, processor);
        self
    }

    /// Set the deadline applied by [`PolicyEvaluator::evaluate`].
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the evaluator.
    #[must_use]
    pub fn build(self) -> PolicyEvaluator {
        PolicyEvaluator {
            processors: self.processors,
            timeout: self.timeout,
        }
    }
}
