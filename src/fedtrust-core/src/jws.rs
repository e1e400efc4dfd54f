//! Compact JWS handling for entity statements.
//!
//! Statements travel as `header.payload.signature`, each part base64url
//! without padding. Parsing never touches the network or the signature;
//! verification is keyed by a caller-supplied JWK set.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use fedtrust_keyring::StatementSigner;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::FederationError;
use crate::statement::{EntityStatement, RegistrationResponse, SignedStatement, StatementType};

/// JOSE header members this crate reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoseHeader {
    /// Signing algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Statement type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Signing key id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// Parse a compact token into an entity statement without verifying it.
pub fn parse(token: &str) -> Result<EntityStatement, FederationError> {
    let [_, payload, _] = split_compact(token)?;
    decode_json(payload, "payload")
}

/// Decode the JOSE header without verifying anything.
pub fn parse_header(token: &str) -> Result<JoseHeader, FederationError> {
    let [header, _, _] = split_compact(token)?;
    decode_json(header, "header")
}

/// Parse a token into the payload shape its `typ` header declares.
pub fn parse_typed(token: &str) -> Result<SignedStatement, FederationError> {
    let [header, payload, _] = split_compact(token)?;
    let header: JoseHeader = decode_json(header, "header")?;

    let typ = header.typ.as_deref().unwrap_or_default();
    match StatementType::from_typ(typ) {
        Some(StatementType::EntityStatement) => {
            Ok(SignedStatement::EntityStatement(decode_json(payload, "payload")?))
        },
        Some(StatementType::ExplicitRegistrationResponse) => Ok(
            SignedStatement::RegistrationResponse(decode_json::<RegistrationResponse>(
                payload, "payload",
            )?),
        ),
        None => Err(FederationError::malformed(format!(
            "unrecognised statement typ {typ:?}"
        ))),
    }
}

/// Verify a token's signature, type header and expiry against `jwks`.
///
/// The accepted algorithms are those the keys declare; RS256 when none
/// declares one.
pub fn verify(
    token: &str,
    jwks: &JwkSet,
    expected: &[StatementType],
    leeway: Duration,
) -> Result<(), FederationError> {
    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| FederationError::signature(format!("malformed JOSE header: {e}")))?;

    let typ = header.typ.as_deref().unwrap_or_default();
    if !expected.iter().any(|t| t.typ().eq_ignore_ascii_case(typ)) {
        return Err(FederationError::signature(format!(
            "unexpected typ {typ:?}"
        )));
    }

    let allowed = allowed_algorithms(jwks);
    if !allowed.contains(&header.alg) {
        return Err(FederationError::signature(format!(
            "algorithm {:?} not allowed by key set ({allowed:?})",
            header.alg
        )));
    }

    let candidates: Vec<&Jwk> = match &header.kid {
        Some(kid) => jwks
            .keys
            .iter()
            .filter(|k| k.common.key_id.as_deref() == Some(kid.as_str()))
            .collect(),
        None => jwks.keys.iter().collect(),
    };
    if candidates.is_empty() {
        return Err(FederationError::signature(format!(
            "no key matches kid {:?}",
            header.kid
        )));
    }

    let mut validation = Validation::new(header.alg);
    validation.leeway = leeway.as_secs();
    validation.validate_aud = false;

    let mut last_error = String::from("no usable key");
    for jwk in candidates {
        if let Some(key_alg) = jwk_algorithm(jwk) {
            if key_alg != header.alg {
                continue;
            }
        }

        let key = match DecodingKey::from_jwk(jwk) {
            Ok(key) => key,
            Err(e) => {
                last_error = format!("unusable key: {e}");
                continue;
            },
        };

        match jsonwebtoken::decode::<serde_json::Value>(token, &key, &validation) {
            Ok(_) => return Ok(()),
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(FederationError::signature(last_error))
}

/// Parse a self-signed entity statement and verify it with its own `jwks`.
pub fn parse_and_verify_self_signed(
    token: &str,
    leeway: Duration,
) -> Result<EntityStatement, FederationError> {
    let statement = parse(token)?;
    let jwks = statement
        .jwks
        .as_ref()
        .ok_or_else(|| FederationError::signature("self-signed statement has no jwks"))?;
    verify(token, jwks, &[StatementType::EntityStatement], leeway)?;
    Ok(statement)
}

/// Check issuer, subject and time claims.
///
/// Every one of `iss`, `sub`, `iat` and `exp` must be present; `iat` may
/// not lie in the future and `exp` not in the past, both within `leeway`.
pub fn validate_fields(
    statement: &EntityStatement,
    expected_issuer: &str,
    expected_subject: &str,
    now: i64,
    leeway: Duration,
) -> Result<(), FederationError> {
    let leeway = i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX);

    let issuer = statement
        .issuer
        .as_deref()
        .ok_or_else(|| FederationError::field("missing iss"))?;
    if issuer.trim() != expected_issuer.trim() {
        return Err(FederationError::field(format!(
            "iss {issuer:?} does not match {expected_issuer:?}"
        )));
    }

    let subject = statement
        .subject
        .as_deref()
        .ok_or_else(|| FederationError::field("missing sub"))?;
    if subject.trim() != expected_subject.trim() {
        return Err(FederationError::field(format!(
            "sub {subject:?} does not match {expected_subject:?}"
        )));
    }

    let issued_at = statement
        .issued_at
        .ok_or_else(|| FederationError::field("missing iat"))?;
    if issued_at > now.saturating_add(leeway) {
        return Err(FederationError::field(format!(
            "iat {issued_at} is in the future"
        )));
    }

    let expires_at = statement
        .expires_at
        .ok_or_else(|| FederationError::field("missing exp"))?;
    if expires_at < now.saturating_sub(leeway) {
        return Err(FederationError::field(format!("expired at {expires_at}")));
    }

    Ok(())
}

/// Boolean form of [`validate_fields`].
pub fn fields_valid(
    statement: &EntityStatement,
    expected_issuer: &str,
    expected_subject: &str,
    now: i64,
    leeway: Duration,
) -> bool {
    validate_fields(statement, expected_issuer, expected_subject, now, leeway).is_ok()
}

/// Serialize `payload` and sign it as a compact statement of `statement_type`.
pub async fn encode_and_sign<T: Serialize + ?Sized>(
    payload: &T,
    statement_type: StatementType,
    signer: &dyn StatementSigner,
) -> Result<String, FederationError> {
    let header = JoseHeader {
        alg: Some(signer.algorithm().jws_name().to_string()),
        typ: Some(statement_type.typ().to_string()),
        kid: Some(signer.key_id().to_string()),
    };

    let header_json = serde_json::to_vec(&header).map_err(|e| FederationError::Signing {
        reason: format!("header: {e}"),
    })?;
    let payload_json = serde_json::to_vec(payload).map_err(|e| FederationError::Signing {
        reason: format!("payload: {e}"),
    })?;

    let signing_input = format!(
        "{}.{}",
        base64url_encode(&header_json),
        base64url_encode(&payload_json)
    );
    let signature = signer.sign(signing_input.as_bytes()).await?;

    tracing::debug!(
        typ = statement_type.typ(),
        kid = signer.key_id(),
        "Signed statement"
    );

    Ok(format!("{signing_input}.{}", base64url_encode(&signature)))
}

/// JWS algorithm a key is usable with: its declared `alg`, otherwise the
/// one its key type and curve imply.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    match jwk.common.key_algorithm.as_ref() {
        Some(declared) => declared_algorithm(declared),
        None => implied_algorithm(&jwk.algorithm),
    }
}

fn declared_algorithm(alg: &KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        // Symmetric and encryption algorithms never sign statements.
        _ => None,
    }
}

fn implied_algorithm(params: &AlgorithmParameters) -> Option<Algorithm> {
    match params {
        AlgorithmParameters::EllipticCurve(ec) => match ec.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(okp) => match okp.curve {
            EllipticCurve::Ed25519 => Some(Algorithm::EdDSA),
            _ => None,
        },
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::OctetKey(_) => None,
    }
}

fn allowed_algorithms(jwks: &JwkSet) -> Vec<Algorithm> {
    let mut allowed: Vec<Algorithm> = Vec::new();
    for alg in jwks.keys.iter().filter_map(jwk_algorithm) {
        if !allowed.contains(&alg) {
            allowed.push(alg);
        }
    }
    if allowed.is_empty() {
        allowed.push(Algorithm::RS256);
    }
    allowed
}

fn split_compact(token: &str) -> Result<[&str; 3], FederationError> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    match parts.as_slice() {
        [header, payload, signature] => Ok([*header, *payload, *signature]),
        _ => Err(FederationError::malformed(format!(
            "expected 3 dot-delimited parts, got {}",
            parts.len()
        ))),
    }
}

fn decode_json<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, FederationError> {
    let bytes = base64url_decode(segment)
        .map_err(|e| FederationError::malformed(format!("{what} is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| FederationError::malformed(format!("{what} is not a statement: {e}")))
}

fn base64url_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(input.trim_end_matches('='))
}

fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}
