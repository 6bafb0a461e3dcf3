//! Environment allowlist criterion (`env`).

use super::{CriterionProcessor, parse_criteria};
use crate::{error::CriterionError, input::AuthInput};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvCriteria {
    whitelist_env_key: String,
}

/// Grants when the subject is listed in a comma separated environment entry.
///
/// Entries are compared exactly; surrounding whitespace is not trimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvAllowlist;

#[async_trait]
impl CriterionProcessor for EnvAllowlist {
    async fn evaluate(
        &self,
        criteria: &serde_json::Value,
        input: &AuthInput,
    ) -> Result<bool, CriterionError> {
        let EnvCriteria { whitelist_env_key } = parse_criteria(criteria)?;
        let subject = input.subject.as_str();
        Ok(match input.env(&whitelist_env_key) {
            Some(list) if !list.is_empty() => list.split(',').any(|entry| entry == subject),
            _ => false,
        })
    }
}
