//! On-chain attestation criterion (`eas`).
//!
//! Grants when the newest non-revoked attestation of the configured schema
//! that mentions the subject carries the subject in the configured field.

pub mod abi;
pub mod chain;
pub mod index;

use super::{CriterionProcessor, parse_criteria};
use crate::{error::CriterionError, input::AuthInput};
use abi::{AbiType, SchemaField, decode_hex};
use async_trait::async_trait;
use chain::ChainRegistry;
use index::{AttestationIndex, AttestationQuery};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EasCriteria {
    schema_uid: String,
    field: String,
    chain_id: String,
}

/// Checks attestations through an [`AttestationIndex`].
#[derive(Debug, Clone)]
pub struct AttestationLookup {
    index: Arc<dyn AttestationIndex>,
    chains: ChainRegistry,
}

impl AttestationLookup {
    /// A lookup over `chains` through `index`.
    #[must_use]
    pub fn new(index: Arc<dyn AttestationIndex>, chains: ChainRegistry) -> Self {
        Self { index, chains }
    }

    /// The chains this lookup can query.
    #[must_use]
    pub const fn chains(&self) -> &ChainRegistry {
        &self.chains
    }
}

#[async_trait]
impl CriterionProcessor for AttestationLookup {
    async fn evaluate(
        &self,
        criteria: &serde_json::Value,
        input: &AuthInput,
    ) -> Result<bool, CriterionError> {
        let criteria: EasCriteria = parse_criteria(criteria)?;
        let chain = self.chains.resolve(&criteria.chain_id)?;
        let subject = input.subject.as_str();

        let query = AttestationQuery::new(&criteria.schema_uid, subject);
        let attestations = self.index.find_attestations(chain, &query).await?;
        let Some(attestation) = attestations.first() else {
            tracing::debug!(schema = %criteria.schema_uid, %subject, "no attestation found");
            return Ok(false);
        };

        let fields = SchemaField::parse_schema(&attestation.schema.schema)?;
        let position = fields
            .iter()
            .position(|field| field.name == criteria.field)
            .ok_or_else(|| {
                CriterionError::Configuration(format!(
                    "field {:?} not in schema {:?}",
                    criteria.field, attestation.schema.schema
                ))
            })?;

        let types: Vec<AbiType> = fields.iter().map(|field| field.kind).collect();
        let values = decode_hex(&types, &attestation.data)?;
        let granted = values
            .get(position)
            .and_then(|value| value.as_str())
            .is_some_and(|value| value == subject);

        tracing::debug!(
            attestation = %attestation.id,
            field = %criteria.field,
            granted,
            "checked attestation"
        );
        Ok(granted)
    }
}
