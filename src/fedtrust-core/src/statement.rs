//! Entity statement model.

use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};

use crate::metadata::{Metadata, MetadataPolicy};

/// JOSE `typ` of an entity statement.
pub const ENTITY_STATEMENT_TYP: &str = "entity-statement+jwt";

/// JOSE `typ` of an explicit registration response.
pub const EXPLICIT_REGISTRATION_RESPONSE_TYP: &str = "explicit-registration-response+jwt";

/// Media type of a compact trust chain, recognised but not accepted for
/// registration.
pub const TRUST_CHAIN_MEDIA_TYPE: &str = "application/trust-chain+json";

/// Kind of signed statement, as declared in the JOSE `typ` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementType {
    /// Self-signed entity configuration or subordinate statement.
    EntityStatement,
    /// Response to an explicit client registration request.
    ExplicitRegistrationResponse,
}

impl StatementType {
    /// `typ` header value.
    pub const fn typ(&self) -> &'static str {
        match self {
            Self::EntityStatement => ENTITY_STATEMENT_TYP,
            Self::ExplicitRegistrationResponse => EXPLICIT_REGISTRATION_RESPONSE_TYP,
        }
    }

    /// HTTP media type for this statement kind.
    pub const fn media_type(&self) -> &'static str {
        match self {
            Self::EntityStatement => "application/entity-statement+jwt",
            Self::ExplicitRegistrationResponse => "application/explicit-registration-response+jwt",
        }
    }

    /// Parse a `typ` header or media type, case-insensitively.
    pub fn from_typ(typ: &str) -> Option<Self> {
        let typ = typ.trim();
        let typ = typ
            .get(..12)
            .filter(|prefix| prefix.eq_ignore_ascii_case("application/"))
            .map_or(typ, |_| &typ[12..]);

        [Self::EntityStatement, Self::ExplicitRegistrationResponse]
            .into_iter()
            .find(|t| t.typ().eq_ignore_ascii_case(typ))
    }
}

/// `aud` claim: one identifier or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience.
    One(String),
    /// Several audiences.
    Many(Vec<String>),
}

impl Audience {
    /// Whether `entity_id` is among the audiences.
    pub fn contains(&self, entity_id: &str) -> bool {
        match self {
            Self::One(aud) => aud == entity_id,
            Self::Many(auds) => auds.iter().any(|aud| aud == entity_id),
        }
    }
}

/// A signed assertion by one federation entity about itself or another.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStatement {
    /// Entity that signed the statement.
    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Entity the statement is about.
    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Issued-at, seconds since the epoch.
    #[serde(rename = "iat", default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,

    /// Expiry, seconds since the epoch.
    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    /// Intended audience (required on registration requests).
    #[serde(rename = "aud", default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Audience>,

    /// Immediate superiors, in preference order. Empty for a trust anchor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authority_hints: Vec<String>,

    /// The subject's public keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,

    /// The subject's metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Policy the issuer imposes on its subordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_policy: Option<MetadataPolicy>,
}

impl EntityStatement {
    /// Whether issuer and subject are present and equal.
    pub fn is_self_signed(&self) -> bool {
        matches!((&self.issuer, &self.subject), (Some(iss), Some(sub)) if iss == sub)
    }

    /// Issuer, or an empty string when absent.
    pub fn issuer_str(&self) -> &str {
        self.issuer.as_deref().unwrap_or_default()
    }

    /// Subject, or an empty string when absent.
    pub fn subject_str(&self) -> &str {
        self.subject.as_deref().unwrap_or_default()
    }
}

/// Payload of an explicit registration response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// Common statement claims.
    #[serde(flatten)]
    pub statement: EntityStatement,

    /// Trust anchor of the chain the registration was accepted through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_anchor_id: Option<String>,
}

/// A parsed statement, tagged by its `typ` header.
#[derive(Debug, Clone)]
pub enum SignedStatement {
    /// `entity-statement+jwt`.
    EntityStatement(EntityStatement),
    /// `explicit-registration-response+jwt`.
    RegistrationResponse(RegistrationResponse),
}

impl SignedStatement {
    /// Kind of statement.
    pub fn statement_type(&self) -> StatementType {
        match self {
            Self::EntityStatement(_) => StatementType::EntityStatement,
            Self::RegistrationResponse(_) => StatementType::ExplicitRegistrationResponse,
        }
    }

    /// Common statement claims.
    pub fn statement(&self) -> &EntityStatement {
        match self {
            Self::EntityStatement(statement) => statement,
            Self::RegistrationResponse(response) => &response.statement,
        }
    }

    /// Consume into the common statement claims.
    pub fn into_statement(self) -> EntityStatement {
        match self {
            Self::EntityStatement(statement) => statement,
            Self::RegistrationResponse(response) => response.statement,
        }
    }
}
