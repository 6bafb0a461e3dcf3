//! Attestation indexers.

use super::chain::ChainConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// GraphQL query for non-revoked attestations of a schema mentioning a
/// subject, newest first.
const ATTESTATIONS_QUERY: &str = r"query Attestations($where: AttestationWhereInput, $take: Int, $orderBy: [AttestationOrderByWithRelationInput!]) {
  attestations(where: $where, take: $take, orderBy: $orderBy) {
    id
    attester
    recipient
    revoked
    time
    data
    schema {
      schema
    }
  }
}";

/// Errors that can occur when querying an attestation index
#[derive(Error, Debug)]
pub enum IndexError {
    /// Error that occurs when connection to the indexer fails
    #[error("Failed to connect to attestation index: {0}")]
    ConnectionFailed(String),

    /// Error that occurs when the indexer answers with a non-success status
    #[error("Attestation index request failed with status {0}")]
    Status(u16),

    /// Error that occurs when an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error reported in the GraphQL response
    #[error("GraphQL error: {0}")]
    Graphql(String),

    /// Error that occurs when the response cannot be deserialized
    #[error("Failed to deserialize response: {0}")]
    Decode(String),

    /// The request did not complete in time
    #[error("Attestation index request timed out")]
    Timeout,
}

impl From<reqwest::Error> for IndexError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            IndexError::Timeout
        } else if error.is_connect() {
            IndexError::ConnectionFailed(error.to_string())
        } else if error.is_decode() {
            IndexError::Decode(error.to_string())
        } else {
            IndexError::RequestFailed(error.to_string())
        }
    }
}

/// The schema record attached to an attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// The schema definition, e.g. `string did,address owner`.
    pub schema: String,
}

/// An attestation as returned by the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Attestation UID.
    pub id: String,
    /// Account that made the attestation.
    #[serde(default)]
    pub attester: String,
    /// Account the attestation is about.
    #[serde(default)]
    pub recipient: String,
    /// Whether it has been revoked.
    #[serde(default)]
    pub revoked: bool,
    /// Creation time, seconds since the epoch.
    #[serde(default)]
    pub time: u64,
    /// ABI-encoded data as `0x` hex.
    pub data: String,
    /// The schema the data is encoded with.
    pub schema: SchemaRecord,
}

/// A lookup of attestations about a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationQuery {
    /// Only attestations of this schema.
    pub schema_uid: String,
    /// Only attestations whose decoded data mentions this value.
    pub subject: String,
    /// At most this many results.
    pub take: u32,
}

impl AttestationQuery {
    /// Default page size.
    pub const DEFAULT_TAKE: u32 = 10;

    /// A query for `subject` under `schema_uid`, with the default page size.
    pub fn new(schema_uid: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            schema_uid: schema_uid.into(),
            subject: subject.into(),
            take: Self::DEFAULT_TAKE,
        }
    }

    fn variables(&self) -> serde_json::Value {
        json!({
            "where": {
                "schemaId": { "equals": self.schema_uid },
                "revoked": { "equals": false },
                "decodedDataJson": { "contains": self.subject },
            },
            "take": self.take,
            "orderBy": [{ "time": "desc" }],
        })
    }
}

/// Source of attestations.
#[async_trait]
pub trait AttestationIndex: std::fmt::Debug + Send + Sync {
    /// Non-revoked attestations matching `query` on `chain`, newest first.
    async fn find_attestations(
        &self,
        chain: &ChainConfig,
        query: &AttestationQuery,
    ) -> Result<Vec<Attestation>, IndexError>;
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<AttestationsData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct AttestationsData {
    attestations: Vec<Attestation>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// An [`AttestationIndex`] backed by the indexer's GraphQL API.
#[derive(Debug, Clone)]
pub struct GraphqlAttestationIndex {
    client: reqwest::Client,
}

impl GraphqlAttestationIndex {
    /// Create an index whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::ConnectionFailed(e.to_string()))?;
        Ok(Self { client })
    }

    /// Use an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AttestationIndex for GraphqlAttestationIndex {
    async fn find_attestations(
        &self,
        chain: &ChainConfig,
        query: &AttestationQuery,
    ) -> Result<Vec<Attestation>, IndexError> {
        let body = json!({
            "query": ATTESTATIONS_QUERY,
            "variables": query.variables(),
        });

        let response = self
            .client
            .post(&chain.graphql_endpoint)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IndexError::Status(response.status().as_u16()));
        }

        let response: GraphqlResponse = response
            .json()
            .await
            .map_err(|e| IndexError::Decode(format!("Failed to parse attestations: {e}")))?;

        if let Some(error) = response.errors.first() {
            return Err(IndexError::Graphql(error.message.clone()));
        }
        let data = response
            .data
            .ok_or_else(|| IndexError::Decode("response has no data".to_string()))?;
        Ok(data.attestations)
    }
}
