//! Error types for keyring operations.

use thiserror::Error;

/// Errors that can occur during keyring operations.
#[derive(Debug, Error)]
pub enum KeyringError {
    /// Key with the specified id not found.
    #[error("Key not found: {kid}")]
    KeyNotFound {
        /// The key id that was not found.
        kid: String,
    },

    /// Key already exists with this id.
    #[error("Key already exists: {kid}")]
    KeyAlreadyExists {
        /// The key id that already exists.
        kid: String,
    },

    /// No enabled signing key for the requested algorithm.
    #[error("No active {algorithm} signing key")]
    NoActiveKey {
        /// JWS algorithm name that was requested.
        algorithm: String,
    },

    /// Signing operation failed.
    #[error("Signing failed: {reason}")]
    SigningFailed {
        /// Reason for the failure.
        reason: String,
    },

    /// Invalid key material.
    #[error("Invalid key: {reason}")]
    InvalidKey {
        /// Reason the key is invalid.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Key store lock was poisoned by a panicking writer.
    #[error("Key store lock poisoned")]
    LockPoisoned,
}

impl From<serde_json::Error> for KeyringError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}
