//! Policy errors.

use crate::criteria::eas::{abi::AbiError, index::IndexError};

/// Errors from a single criterion check.
///
/// The evaluator logs these and treats the policy as denied; they never
/// reach the caller of [`evaluate`][crate::PolicyEvaluator::evaluate].
#[derive(Debug, thiserror::Error)]
pub enum CriterionError {
    /// The policy's criteria are malformed or name something unknown.
    #[error("invalid criteria: {0}")]
    Configuration(String),

    /// The attestation index could not be reached or answered with an error.
    #[error("attestation lookup failed: {0}")]
    Network(String),

    /// Attestation data could not be decoded.
    #[error("failed to decode attestation: {0}")]
    Decode(String),

    /// The check did not finish before the deadline.
    #[error("criterion check timed out")]
    Timeout,
}

impl From<AbiError> for CriterionError {
    fn from(error: AbiError) -> Self {
        CriterionError::Decode(error.to_string())
    }
}

impl From<IndexError> for CriterionError {
    fn from(error: IndexError) -> Self {
        match error {
            IndexError::Decode(_) => CriterionError::Decode(error.to_string()),
            IndexError::Timeout => CriterionError::Timeout,
            _ => CriterionError::Network(error.to_string()),
        }
    }
}

/// Errors from loading policies.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policy list is not valid JSON of the expected shape.
    #[error("malformed policy list: {0}")]
    Malformed(String),
}
