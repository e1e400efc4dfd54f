//! Key algorithm, use and status types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// JWS signing algorithm of a local key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SigningAlgorithm {
    /// ECDSA using P-256 and SHA-256.
    #[default]
    #[serde(rename = "ES256")]
    Es256,

    /// Edwards-curve signatures with Ed25519.
    #[serde(rename = "EdDSA")]
    EdDsa,
}

impl SigningAlgorithm {
    /// The `alg` value used in JOSE headers and JWKs.
    #[must_use]
    pub const fn jws_name(&self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::EdDsa => "EdDSA",
        }
    }

    /// Parse a JOSE `alg` value.
    #[must_use]
    pub fn from_jws_name(name: &str) -> Option<Self> {
        match name {
            "ES256" => Some(Self::Es256),
            "EdDSA" => Some(Self::EdDsa),
            _ => None,
        }
    }

    /// Signature size in bytes (R || S for ECDSA).
    #[must_use]
    pub const fn signature_size(&self) -> usize {
        match self {
            Self::Es256 => 64,
            Self::EdDsa => 64,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.jws_name())
    }
}

/// Intended use of a key (JWK `use` member).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KeyUse {
    /// Signature keys, published in entity statements.
    #[default]
    #[serde(rename = "sig")]
    Signature,

    /// Encryption keys, never used for statements.
    #[serde(rename = "enc")]
    Encryption,
}

impl KeyUse {
    /// JWK `use` member value.
    #[must_use]
    pub const fn jwk_name(&self) -> &'static str {
        match self {
            Self::Signature => "sig",
            Self::Encryption => "enc",
        }
    }
}

/// Lifecycle status of a local key.
///
/// Active keys sign, passive keys are still published so that statements
/// signed before a rotation keep verifying, disabled keys are neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Signs and is published.
    #[default]
    Active,
    /// Published only.
    Passive,
    /// Ignored.
    Disabled,
}

impl KeyStatus {
    /// Whether the key is published in the entity's key set.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Active | Self::Passive)
    }
}
