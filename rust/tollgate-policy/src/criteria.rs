//! Criterion processors: the checks a policy can be conditioned on.

pub mod eas;
pub mod env;
pub mod nameservice;

use crate::{error::CriterionError, input::AuthInput};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Decides whether a policy's criteria hold for an input.
///
/// Implementations parse `criteria` themselves, so a malformed policy only
/// affects the policy that carries it.
#[async_trait]
pub trait CriterionProcessor: Debug + Send + Sync {
    /// Returns `Ok(true)` if the criteria hold for `input`.
    async fn evaluate(
        &self,
        criteria: &serde_json::Value,
        input: &AuthInput,
    ) -> Result<bool, CriterionError>;
}

/// Deserialize a processor's criteria, reporting failures as configuration
/// errors.
pub(crate) fn parse_criteria<T: DeserializeOwned>(
    criteria: &serde_json::Value,
) -> Result<T, CriterionError> {
    T::deserialize(criteria).map_err(|e| CriterionError::Configuration(e.to_string()))
}
