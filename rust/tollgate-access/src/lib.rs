//! Policy-gated delegation issuance.
//!
//! [`AccessService`] evaluates a requester against the configured access
//! policies and, when the `ucan` token type is granted, has the
//! [`DelegationIssuer`] mint a UCAN delegation over the server's space for
//! the requester. An empty grant is a denial, reported as
//! [`Authorization::Denied`] rather than as an error.

pub mod config;
pub mod issuer;
pub mod service;

pub use config::{AccessConfig, ConfigError};
pub use issuer::{DEFAULT_ABILITIES, DEFAULT_LIFETIME, DelegationIssuer, IssueError, UCAN_TOKEN_TYPE};
pub use service::{AccessError, AccessService, Authorization};
