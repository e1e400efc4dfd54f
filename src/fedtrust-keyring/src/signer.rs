//! Statement signer trait.
//!
//! Every key backend implements [`StatementSigner`]. The federation core only
//! talks to this trait, so keys held by an HSM or a remote KMS can be plugged
//! in next to the software signers.

use async_trait::async_trait;
use jsonwebtoken::jwk::Jwk;

use crate::error::KeyringError;
use crate::types::SigningAlgorithm;

/// A private key able to sign JWS signing input.
#[async_trait]
pub trait StatementSigner: Send + Sync {
    /// JWS algorithm produced by [`sign`](Self::sign).
    fn algorithm(&self) -> SigningAlgorithm;

    /// Key id published in the JWK and the JOSE header.
    fn key_id(&self) -> &str;

    /// Sign `data` and return the raw JWS signature bytes.
    ///
    /// For ES256 this is the fixed-size `R || S` encoding, not DER.
    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyringError>;

    /// Public half of the key as a JWK with `kid`, `alg` and `use` set.
    fn public_jwk(&self) -> Result<Jwk, KeyringError>;
}
