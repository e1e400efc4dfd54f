//! Explicit client registration at an OpenID Provider.
//!
//! A Relying Party posts its entity configuration. The provider verifies it,
//! resolves the RP's trust chains, applies the first acceptable chain's policy
//! and answers with a signed registration response.

use std::sync::Arc;

use chrono::Utc;
use fedtrust_keyring::LocalKeyStore;
use tracing::{info, instrument, warn};

use crate::combiner::require_acceptable_chain;
use crate::config::{ClientRegistrationType, FederationConfig};
use crate::error::FederationError;
use crate::jws;
use crate::metadata::{JsonClaim, Metadata, RelyingPartyMetadata};
use crate::resolver::TrustChainResolver;
use crate::statement::{
    Audience, EntityStatement, RegistrationResponse, StatementType, TRUST_CHAIN_MEDIA_TYPE,
};

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    /// Signed registration response.
    pub token: String,
    /// Media type to answer with.
    pub media_type: &'static str,
    /// Effective client metadata, policy applied.
    pub client_metadata: RelyingPartyMetadata,
    /// Anchor of the accepted chain.
    pub trust_anchor_id: String,
    /// Registered client.
    pub leaf_id: String,
}

/// Handles explicit registration requests for this provider.
pub struct ExplicitRegistrationService {
    config: FederationConfig,
    resolver: TrustChainResolver,
    keys: Arc<LocalKeyStore>,
}

impl ExplicitRegistrationService {
    /// Create the service.
    pub fn new(
        config: FederationConfig,
        resolver: TrustChainResolver,
        keys: Arc<LocalKeyStore>,
    ) -> Self {
        Self {
            config,
            resolver,
            keys,
        }
    }

    /// Register the RP whose entity configuration is `body`.
    #[instrument(skip(self, body))]
    pub async fn register(
        &self,
        media_type: &str,
        body: &str,
    ) -> Result<RegistrationOutcome, FederationError> {
        if !self.config.supports_explicit_registration() {
            return Err(FederationError::RegistrationNotSupported {
                reason: "explicit registration is not enabled".into(),
            });
        }
        if self.config.authority_hints.is_empty() {
            return Err(FederationError::RegistrationNotSupported {
                reason: "this provider has no authority hints".into(),
            });
        }

        check_media_type(media_type)?;

        let skew = self.resolver.config().clock_skew;
        let request = jws::parse_and_verify_self_signed(body.trim(), skew)
            .map_err(|e| FederationError::InvalidRegistrationRequest {
                reason: e.to_string(),
            })?;
        let now = Utc::now().timestamp();
        self.validate_request(&request, now)?;

        let leaf_id = request.issuer_str().to_string();
        let chains = self
            .resolver
            .resolve_trust_chains(&request, &self.config.trust_anchor_set(), true)
            .await;
        let declared = Metadata {
            openid_relying_party: request
                .metadata
                .as_ref()
                .and_then(|m| m.openid_relying_party.clone()),
            ..Default::default()
        };
        let accepted = require_acceptable_chain(chains, &declared, &leaf_id)?;

        let mut client_metadata = accepted
            .metadata
            .openid_relying_party
            .unwrap_or_default();
        client_metadata.client_id = Some(leaf_id.clone());
        client_metadata.client_registration_types =
            Some(vec![ClientRegistrationType::Explicit.as_str().to_string()]);
        if client_metadata.jwks.is_none()
            && client_metadata.jwks_uri.is_none()
            && client_metadata.common.signed_jwks_uri.is_none()
        {
            client_metadata.jwks = request
                .jwks
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| FederationError::Signing {
                    reason: format!("jwks: {e}"),
                })?
                .map(JsonClaim);
        }

        let response = RegistrationResponse {
            statement: EntityStatement {
                issuer: Some(self.config.entity_id.clone()),
                subject: Some(leaf_id.clone()),
                issued_at: Some(now),
                expires_at: request.expires_at,
                audience: Some(Audience::One(leaf_id.clone())),
                authority_hints: accepted
                    .chain
                    .immediate_superior()
                    .map(|s| vec![s.to_string()])
                    .unwrap_or_default(),
                jwks: None,
                metadata: Some(Metadata {
                    openid_relying_party: Some(client_metadata.clone()),
                    ..Default::default()
                }),
                metadata_policy: None,
            },
            trust_anchor_id: Some(accepted.chain.trust_anchor_id.clone()),
        };

        let signer = self.keys.active_signer(self.config.signing_algorithm)?;
        let token = jws::encode_and_sign(
            &response,
            StatementType::ExplicitRegistrationResponse,
            signer.as_ref(),
        )
        .await?;

        info!(
            client_id = %leaf_id,
            trust_anchor = %accepted.chain.trust_anchor_id,
            "Explicit registration accepted"
        );

        Ok(RegistrationOutcome {
            token,
            media_type: StatementType::ExplicitRegistrationResponse.media_type(),
            client_metadata,
            trust_anchor_id: accepted.chain.trust_anchor_id,
            leaf_id,
        })
    }

    fn validate_request(&self, request: &EntityStatement, now: i64) -> Result<(), FederationError> {
        let invalid = |reason: &str| {
            warn!(reason, "Registration request rejected");
            Err(FederationError::InvalidRegistrationRequest {
                reason: reason.to_string(),
            })
        };

        if !request.is_self_signed() {
            return invalid("iss and sub must be the same entity");
        }
        let skew = self.resolver.config().clock_skew;
        if let Err(e) = jws::validate_fields(
            request,
            request.issuer_str(),
            request.subject_str(),
            now,
            skew,
        ) {
            return invalid(&e.to_string());
        }
        if request.authority_hints.is_empty() {
            return invalid("authority_hints is empty");
        }
        if request
            .metadata
            .as_ref()
            .and_then(|m| m.openid_relying_party.as_ref())
            .is_none()
        {
            return invalid("openid_relying_party metadata is missing");
        }
        match &request.audience {
            Some(aud) if aud.contains(&self.config.entity_id) => Ok(()),
            _ => invalid("aud does not name this provider"),
        }
    }
}

fn check_media_type(media_type: &str) -> Result<(), FederationError> {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();

    if essence.eq_ignore_ascii_case(StatementType::EntityStatement.media_type()) {
        Ok(())
    } else if essence.eq_ignore_ascii_case(TRUST_CHAIN_MEDIA_TYPE) {
        Err(FederationError::RegistrationNotSupported {
            reason: "trust chain submissions are not accepted".into(),
        })
    } else {
        Err(FederationError::UnsupportedMediaType {
            media_type: media_type.to_string(),
        })
    }
}
