//! Public JWK construction and RFC 7638 thumbprints.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::KeyringError;
use crate::types::{KeyUse, SigningAlgorithm};

/// Build a P-256 signature JWK from affine coordinates.
///
/// The `kid` is the key's RFC 7638 thumbprint.
pub fn ec_p256_jwk(x: &[u8], y: &[u8]) -> Result<Jwk, KeyringError> {
    if x.len() != 32 || y.len() != 32 {
        return Err(KeyringError::InvalidKey {
            reason: format!(
                "P-256 coordinates must be 32 bytes, got x={} y={}",
                x.len(),
                y.len()
            ),
        });
    }

    let value = json!({
        "kty": "EC",
        "crv": "P-256",
        "x": URL_SAFE_NO_PAD.encode(x),
        "y": URL_SAFE_NO_PAD.encode(y),
        "use": KeyUse::Signature.jwk_name(),
        "alg": SigningAlgorithm::Es256.jws_name(),
    });
    with_thumbprint_kid(serde_json::from_value(value)?)
}

/// Build an Ed25519 signature JWK from the 32-byte public key.
pub fn okp_ed25519_jwk(public_key: &[u8]) -> Result<Jwk, KeyringError> {
    if public_key.len() != 32 {
        return Err(KeyringError::InvalidKey {
            reason: format!("Ed25519 public key must be 32 bytes, got {}", public_key.len()),
        });
    }

    let value = json!({
        "kty": "OKP",
        "crv": "Ed25519",
        "x": URL_SAFE_NO_PAD.encode(public_key),
        "use": KeyUse::Signature.jwk_name(),
        "alg": SigningAlgorithm::EdDsa.jws_name(),
    });
    with_thumbprint_kid(serde_json::from_value(value)?)
}

/// RFC 7638 thumbprint (SHA-256, base64url) of a public JWK.
pub fn thumbprint(jwk: &Jwk) -> Result<String, KeyringError> {
    // Required members only, lexicographic order, no whitespace.
    let canonical = match &jwk.algorithm {
        AlgorithmParameters::EllipticCurve(p) => format!(
            r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
            curve_name(&p.curve)?,
            p.x,
            p.y
        ),
        AlgorithmParameters::OctetKeyPair(p) => format!(
            r#"{{"crv":"{}","kty":"OKP","x":"{}"}}"#,
            curve_name(&p.curve)?,
            p.x
        ),
        AlgorithmParameters::RSA(p) => {
            format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, p.e, p.n)
        },
        _ => {
            return Err(KeyringError::InvalidKey {
                reason: "symmetric keys cannot be published".into(),
            })
        },
    };

    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes())))
}

fn with_thumbprint_kid(mut jwk: Jwk) -> Result<Jwk, KeyringError> {
    jwk.common.key_id = Some(thumbprint(&jwk)?);
    Ok(jwk)
}

fn curve_name(curve: &EllipticCurve) -> Result<String, KeyringError> {
    serde_json::to_value(curve)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| KeyringError::SerializationError("curve is not a string".into()))
}
