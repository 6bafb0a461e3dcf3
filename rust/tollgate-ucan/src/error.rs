//! Error types for access services.
//!
//! This module provides error types that can be used by HTTP handlers
//! to return consistent error responses. The error codes map to specific
//! HTTP status codes and provide structured error information.

use crate::{ArchiveError, DelegationError, SessionError, VerificationError};
use serde::Serialize;

/// Error codes returned by access services.
///
/// Each code maps to an HTTP status code via [`ErrorCode::status_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 400 Bad Request - Input validation errors
    /// Base64 decoding failed
    InvalidBase64,
    /// DAG-CBOR or CAR parsing failed
    InvalidCbor,
    /// Invalid argument (generic)
    InvalidArgument,

    // 401 Unauthorized - Authentication errors
    /// Signature verification failed
    SignatureInvalid,
    /// Audience or issuer does not match the expected principal
    AudienceMismatch,
    /// A delegation has expired
    DelegationExpired,
    /// A delegation is not yet valid (nbf in future)
    DelegationNotYetValid,
    /// Required proof not found
    ProofNotFound,
    /// No attestation from the trusted authority
    AttestationNotFound,

    // 403 Forbidden - Authorization errors
    /// Delegation chain is invalid
    ChainInvalid,
    /// A capability is not backed by the chain
    CapabilityNotGranted,
    /// No policy grants access
    AccessDenied,

    // 500 Internal Server Error
    /// Internal server error
    InternalError,

    // 504 Gateway Timeout
    /// A deadline passed
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            ErrorCode::InvalidBase64 | ErrorCode::InvalidCbor | ErrorCode::InvalidArgument => 400,

            // 401 Unauthorized
            ErrorCode::SignatureInvalid
            | ErrorCode::AudienceMismatch
            | ErrorCode::DelegationExpired
            | ErrorCode::DelegationNotYetValid
            | ErrorCode::ProofNotFound
            | ErrorCode::AttestationNotFound => 401,

            // 403 Forbidden
            ErrorCode::ChainInvalid | ErrorCode::CapabilityNotGranted | ErrorCode::AccessDenied => {
                403
            }

            // 500 Internal Server Error
            ErrorCode::InternalError => 500,

            // 504 Gateway Timeout
            ErrorCode::Timeout => 504,
        }
    }
}

/// Service error with code and message.
///
/// This is a generic error type that can be converted to HTTP responses
/// by framework-specific code. It contains an [`ErrorCode`] for classification
/// and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceError {
    /// The error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
}

impl ServiceError {
    /// Create a new service error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.code.status_code()
    }

    // Convenience constructors for common errors

    /// Invalid base64 encoding.
    pub fn invalid_base64(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidBase64, message)
    }

    /// Invalid DAG-CBOR or CAR encoding.
    pub fn invalid_cbor(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidCbor, message)
    }

    /// Invalid argument.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Signature verification failed.
    pub fn signature_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SignatureInvalid, message)
    }

    /// No policy granted access.
    pub fn access_denied() -> Self {
        Self::new(ErrorCode::AccessDenied, "Access denied")
    }

    /// Delegation chain is invalid.
    pub fn chain_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ChainInvalid, message)
    }

    /// A deadline passed.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<VerificationError> for ServiceError {
    fn from(err: VerificationError) -> Self {
        let message = err.to_string();
        match err {
            VerificationError::InvalidSignature { .. } | VerificationError::UnresolvableIssuer(_) => {
                ServiceError::signature_invalid(message)
            }
            VerificationError::Expired { .. } => {
                ServiceError::new(ErrorCode::DelegationExpired, message)
            }
            VerificationError::NotYetValid { .. } => {
                ServiceError::new(ErrorCode::DelegationNotYetValid, message)
            }
            VerificationError::AudienceMismatch { .. } | VerificationError::IssuerMismatch { .. } => {
                ServiceError::new(ErrorCode::AudienceMismatch, message)
            }
            VerificationError::BrokenChain { .. } | VerificationError::TooDeep => {
                ServiceError::chain_invalid(message)
            }
            VerificationError::CapabilityNotGranted { .. } => {
                ServiceError::new(ErrorCode::CapabilityNotGranted, message)
            }
            VerificationError::AttestationNotFound(_) => {
                ServiceError::new(ErrorCode::AttestationNotFound, message)
            }
            VerificationError::ProofNotFound(_) => {
                ServiceError::new(ErrorCode::ProofNotFound, message)
            }
            VerificationError::Timeout => ServiceError::timeout(message),
        }
    }
}

impl From<ArchiveError> for ServiceError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Encoding(_) => ServiceError::internal(err.to_string()),
            ArchiveError::TooDeep => ServiceError::chain_invalid(err.to_string()),
            ArchiveError::TooManyBlocks => ServiceError::invalid_argument(err.to_string()),
            _ => ServiceError::invalid_cbor(err.to_string()),
        }
    }
}

impl From<DelegationError> for ServiceError {
    fn from(err: DelegationError) -> Self {
        match err {
            DelegationError::Decoding(_) | DelegationError::ProofMismatch(_) => {
                ServiceError::invalid_cbor(err.to_string())
            }
            DelegationError::InvalidSignature(_) => ServiceError::signature_invalid(err.to_string()),
            DelegationError::MissingAudience | DelegationError::NoCapabilities => {
                ServiceError::invalid_argument(err.to_string())
            }
            DelegationError::Nonce(_) | DelegationError::Encoding(_) | DelegationError::Signing(_) => {
                ServiceError::internal(err.to_string())
            }
        }
    }
}

impl From<SessionError> for ServiceError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Delegation(inner) => inner.into(),
            SessionError::NotHeld { .. } => {
                ServiceError::new(ErrorCode::CapabilityNotGranted, err.to_string())
            }
            SessionError::SpaceNotFound(_)
            | SessionError::NoProofs
            | SessionError::UnsupportedAuthority(_) => ServiceError::internal(err.to_string()),
        }
    }
}
