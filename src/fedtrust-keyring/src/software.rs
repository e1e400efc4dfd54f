//! Software-only signer implementations.
//!
//! Keys live in process memory. Suitable for development, federation test
//! beds and deployments where the entity statement key is provisioned from
//! a secrets store at startup.
//!
//! ## Supported Algorithms
//!
//! - `SoftwareSigner` - ECDSA P-256 (`ES256`)
//! - `Ed25519SoftwareSigner` - Ed25519 (`EdDSA`)

use async_trait::async_trait;
use ed25519_dalek::{
    Signature as Ed25519Signature, Signer as Ed25519SignerTrait, SigningKey as Ed25519SigningKey,
};
use jsonwebtoken::jwk::Jwk;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::KeyringError;
use crate::jwk::{ec_p256_jwk, okp_ed25519_jwk};
use crate::signer::StatementSigner;
use crate::types::SigningAlgorithm;

/// In-memory ECDSA P-256 signer.
pub struct SoftwareSigner {
    signing_key: SigningKey,
    jwk: Jwk,
    kid: String,
}

impl SoftwareSigner {
    /// Generate a fresh random P-256 key.
    pub fn generate() -> Result<Self, KeyringError> {
        let signer = Self::with_key(SigningKey::random(&mut OsRng))?;
        tracing::info!(
            kid = %signer.kid,
            "SoftwareSigner: generated ephemeral ECDSA P-256 key"
        );
        Ok(signer)
    }

    /// Wrap an existing P-256 signing key.
    pub fn with_key(signing_key: SigningKey) -> Result<Self, KeyringError> {
        let encoded = signing_key.verifying_key().to_encoded_point(false);
        // Uncompressed SEC1: 0x04 || X (32) || Y (32)
        let bytes = encoded.as_bytes();
        if bytes.len() != 65 {
            return Err(KeyringError::InvalidKey {
                reason: format!("unexpected P-256 point length {}", bytes.len()),
            });
        }

        let jwk = ec_p256_jwk(&bytes[1..33], &bytes[33..65])?;
        let kid = jwk.common.key_id.clone().unwrap_or_default();

        Ok(Self {
            signing_key,
            jwk,
            kid,
        })
    }

    /// Import a key from its 32-byte big-endian scalar.
    pub fn from_bytes(key_bytes: &[u8]) -> Result<Self, KeyringError> {
        let signing_key =
            SigningKey::from_slice(key_bytes).map_err(|e| KeyringError::InvalidKey {
                reason: format!("invalid P-256 scalar: {e}"),
            })?;
        Self::with_key(signing_key)
    }
}

#[async_trait]
impl StatementSigner for SoftwareSigner {
    fn algorithm(&self) -> SigningAlgorithm {
        SigningAlgorithm::Es256
    }

    fn key_id(&self) -> &str {
        &self.kid
    }

    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyringError> {
        // SHA-256 is applied by the ECDSA signer.
        let signature: Signature = self.signing_key.sign(data);

        // Fixed-size R || S as JWS requires.
        Ok(signature.to_bytes().to_vec())
    }

    fn public_jwk(&self) -> Result<Jwk, KeyringError> {
        Ok(self.jwk.clone())
    }
}

/// In-memory Ed25519 signer.
pub struct Ed25519SoftwareSigner {
    signing_key: Ed25519SigningKey,
    jwk: Jwk,
    kid: String,
}

impl Ed25519SoftwareSigner {
    /// Generate a fresh random Ed25519 key.
    pub fn generate() -> Result<Self, KeyringError> {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let signer = Self::from_bytes(&seed)?;
        tracing::info!(
            kid = %signer.kid,
            "Ed25519SoftwareSigner: generated ephemeral key"
        );
        Ok(signer)
    }

    /// Create a signer from a raw 32-byte Ed25519 seed.
    pub fn from_bytes(key_bytes: &[u8]) -> Result<Self, KeyringError> {
        if key_bytes.len() != 32 {
            tracing::error!(
                key_len = key_bytes.len(),
                "Ed25519SoftwareSigner: invalid key length (expected 32 bytes)"
            );
            return Err(KeyringError::InvalidKey {
                reason: format!(
                    "Ed25519 key must be 32 bytes, got {} bytes",
                    key_bytes.len()
                ),
            });
        }

        let mut seed = [0u8; 32];
        seed.copy_from_slice(key_bytes);
        let signing_key = Ed25519SigningKey::from_bytes(&seed);

        let jwk = okp_ed25519_jwk(signing_key.verifying_key().as_bytes())?;
        let kid = jwk.common.key_id.clone().unwrap_or_default();

        Ok(Self {
            signing_key,
            jwk,
            kid,
        })
    }
}

#[async_trait]
impl StatementSigner for Ed25519SoftwareSigner {
    fn algorithm(&self) -> SigningAlgorithm {
        SigningAlgorithm::EdDsa
    }

    fn key_id(&self) -> &str {
        &self.kid
    }

    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyringError> {
        let signature: Ed25519Signature = self.signing_key.sign(data);
        Ok(signature.to_bytes().to_vec())
    }

    fn public_jwk(&self) -> Result<Jwk, KeyringError> {
        Ok(self.jwk.clone())
    }
}
