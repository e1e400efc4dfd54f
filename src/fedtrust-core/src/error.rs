//! Error types for federation operations.

use fedtrust_keyring::KeyringError;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::policy::PolicyError;

/// Errors that can occur while resolving, verifying or registering.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Token is not a well-formed compact statement.
    #[error("Malformed statement: {reason}")]
    MalformedStatement {
        /// What was wrong with the token.
        reason: String,
    },

    /// Signature, type header or expiry check failed.
    #[error("Signature verification failed: {reason}")]
    SignatureInvalid {
        /// Reason for failure.
        reason: String,
    },

    /// Issuer, subject or time fields do not match expectations.
    #[error("Statement field validation failed: {reason}")]
    FieldValidationFailed {
        /// Which field failed and why.
        reason: String,
    },

    /// Policies along a chain cannot be reconciled.
    #[error("Policy conflict on `{claim}`: {reason}")]
    PolicyConflict {
        /// Claim whose operators conflict.
        claim: String,
        /// Description of the conflict.
        reason: String,
    },

    /// Declared metadata does not satisfy the combined policy.
    #[error("Policy violation on `{claim}`: {reason}")]
    PolicyViolation {
        /// Claim that failed enforcement.
        claim: String,
        /// Description of the violation.
        reason: String,
    },

    /// No trust anchor reachable, or no chain accepts the metadata.
    #[error("No acceptable trust chain for {entity_id}")]
    NoAcceptableChain {
        /// Leaf entity that could not be anchored.
        entity_id: String,
    },

    /// Remote fetch failed or timed out.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Registration request statement is unacceptable.
    #[error("Invalid registration request: {reason}")]
    InvalidRegistrationRequest {
        /// Reason for rejection.
        reason: String,
    },

    /// A provider's registration response is unacceptable.
    #[error("Invalid registration response: {reason}")]
    InvalidRegistrationResponse {
        /// Reason for rejection.
        reason: String,
    },

    /// This entity does not accept the requested registration flow.
    #[error("Registration not supported: {reason}")]
    RegistrationNotSupported {
        /// Why the flow is unavailable.
        reason: String,
    },

    /// Registration body media type is not accepted.
    #[error("Unsupported media type: {media_type}")]
    UnsupportedMediaType {
        /// The rejected media type.
        media_type: String,
    },

    /// Producing this entity's own signed statement failed.
    #[error("Signing failed: {reason}")]
    Signing {
        /// Reason for failure.
        reason: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Error message.
        message: String,
    },
}

impl FederationError {
    /// Create a malformed-statement error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedStatement {
            reason: reason.into(),
        }
    }

    /// Create a signature error.
    pub fn signature(reason: impl Into<String>) -> Self {
        Self::SignatureInvalid {
            reason: reason.into(),
        }
    }

    /// Create a field validation error.
    pub fn field(reason: impl Into<String>) -> Self {
        Self::FieldValidationFailed {
            reason: reason.into(),
        }
    }

    /// Errors that drop a single authority-hint branch and nothing else.
    #[must_use]
    pub fn is_branch_local(&self) -> bool {
        matches!(
            self,
            Self::MalformedStatement { .. }
                | Self::SignatureInvalid { .. }
                | Self::FieldValidationFailed { .. }
                | Self::Fetch(_)
        )
    }

    /// Errors that end a resolution or registration outright.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NoAcceptableChain { .. })
    }
}

impl From<PolicyError> for FederationError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::Conflict { claim, reason } => Self::PolicyConflict {
                claim: claim.unwrap_or_default(),
                reason,
            },
            PolicyError::Violation { claim, reason } => Self::PolicyViolation { claim, reason },
        }
    }
}

impl From<KeyringError> for FederationError {
    fn from(e: KeyringError) -> Self {
        Self::Signing {
            reason: e.to_string(),
        }
    }
}
