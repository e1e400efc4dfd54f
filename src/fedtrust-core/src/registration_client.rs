//! Explicit registration from the Relying Party side.
//!
//! The client fetches the provider's entity configuration, checks that it
//! offers explicit registration, resolves the provider to the chosen trust
//! anchor, posts this entity's configuration addressed to the provider and
//! verifies the signed response with the provider's keys.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use fedtrust_keyring::LocalKeyStore;
use tracing::{debug, info, instrument, warn};

use crate::config::{ClientRegistrationType, FederationConfig};
use crate::entity_configuration::EntityConfigurationBuilder;
use crate::error::FederationError;
use crate::fetch::FederationFetcher;
use crate::jws;
use crate::metadata::{OpenIdProviderMetadata, RelyingPartyMetadata};
use crate::resolver::{TrustChain, TrustChainResolver};
use crate::statement::{EntityStatement, RegistrationResponse, SignedStatement, StatementType};

/// A registration the provider accepted.
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    /// Client identifier; this entity's identifier unless the provider
    /// assigned another.
    pub client_id: String,
    /// Secret, when the provider issued one.
    pub client_secret: Option<String>,
    /// Anchor the provider accepted this client under.
    pub trust_anchor_id: String,
    /// Superior the provider resolved this client through.
    pub authority_hints: Vec<String>,
    /// End of the registration's validity.
    pub expires_at: Option<i64>,
    /// Client metadata as registered.
    pub client_metadata: RelyingPartyMetadata,
    /// Provider metadata from its entity configuration.
    pub provider: OpenIdProviderMetadata,
    /// Provider's chain to the requested trust anchor.
    pub provider_chain: TrustChain,
}

/// Registers this entity as a client at OpenID Providers.
pub struct ExplicitRegistrationClient {
    config: FederationConfig,
    fetcher: Arc<dyn FederationFetcher>,
    resolver: TrustChainResolver,
    keys: Arc<LocalKeyStore>,
}

impl ExplicitRegistrationClient {
    /// Create a client; provider chains resolve with the configuration's
    /// resolver settings.
    pub fn new(
        config: FederationConfig,
        fetcher: Arc<dyn FederationFetcher>,
        keys: Arc<LocalKeyStore>,
    ) -> Self {
        let resolver = TrustChainResolver::new(Arc::clone(&fetcher), config.resolver_config());
        Self {
            config,
            fetcher,
            resolver,
            keys,
        }
    }

    /// Register at `provider_id`, trusting it through `trust_anchor`.
    #[instrument(skip(self, metadata))]
    pub async fn register(
        &self,
        provider_id: &str,
        trust_anchor: &str,
        metadata: RelyingPartyMetadata,
    ) -> Result<ClientRegistration, FederationError> {
        if self.config.authority_hints.is_empty() {
            return Err(FederationError::RegistrationNotSupported {
                reason: "this entity has no authority hints".into(),
            });
        }

        // 1. Provider configuration, self-verified.
        let provider_statement = self.resolver.fetch_verified_configuration(provider_id).await?;

        // 2. Explicit registration on offer.
        let (provider, endpoint) = explicit_registration_endpoint(&provider_statement)?;

        // 3. Provider anchored at the chosen trust anchor.
        let anchors = BTreeSet::from([trust_anchor.to_string()]);
        let provider_chain = self
            .resolver
            .resolve_trust_chains(&provider_statement, &anchors, false)
            .await
            .into_iter()
            .next()
            .ok_or_else(|| FederationError::NoAcceptableChain {
                entity_id: provider_id.to_string(),
            })?;
        debug!(
            provider = %provider_id,
            chain_length = provider_chain.len(),
            "Provider anchored"
        );

        // 4. Request statement addressed to the provider.
        let now = Utc::now().timestamp();
        let request = EntityConfigurationBuilder::new(self.config.clone())
            .with_key_store(&self.keys)?
            .with_relying_party(metadata)
            .with_audience(provider_id)
            .sign(&self.keys, now)
            .await?;

        // 5. Post it.
        let body = self
            .resolver
            .with_deadline(
                &endpoint,
                self.fetcher.post_registration(
                    &endpoint,
                    StatementType::EntityStatement.media_type(),
                    &request,
                ),
            )
            .await?;

        // 6. Signed response from the provider about this entity.
        let response =
            self.verify_response(&body, &provider_statement, Utc::now().timestamp())?;
        let client_metadata = response
            .statement
            .metadata
            .as_ref()
            .and_then(|m| m.openid_relying_party.clone())
            .ok_or_else(|| rejected("response carries no openid_relying_party metadata"))?;
        let trust_anchor_id = response
            .trust_anchor_id
            .clone()
            .ok_or_else(|| rejected("response names no trust_anchor_id"))?;

        let client_id = client_metadata
            .client_id
            .clone()
            .unwrap_or_else(|| self.config.entity_id.clone());

        info!(
            provider = %provider_id,
            client_id = %client_id,
            trust_anchor = %trust_anchor_id,
            "Explicit registration completed"
        );

        Ok(ClientRegistration {
            client_id,
            client_secret: client_metadata.client_secret.clone(),
            trust_anchor_id,
            authority_hints: response.statement.authority_hints,
            expires_at: response.statement.expires_at,
            client_metadata,
            provider,
            provider_chain,
        })
    }

    fn verify_response(
        &self,
        token: &str,
        provider: &EntityStatement,
        now: i64,
    ) -> Result<RegistrationResponse, FederationError> {
        let skew = self.resolver.config().clock_skew;
        let jwks = provider
            .jwks
            .as_ref()
            .ok_or_else(|| rejected("provider publishes no jwks"))?;
        jws::verify(token, jwks, &[StatementType::ExplicitRegistrationResponse], skew)
            .map_err(|e| rejected(&e.to_string()))?;

        let SignedStatement::RegistrationResponse(response) =
            jws::parse_typed(token).map_err(|e| rejected(&e.to_string()))?
        else {
            return Err(rejected("not an explicit registration response"));
        };

        jws::validate_fields(
            &response.statement,
            provider.issuer_str(),
            &self.config.entity_id,
            now,
            skew,
        )
        .map_err(|e| rejected(&e.to_string()))?;

        if let Some(aud) = &response.statement.audience {
            if !aud.contains(&self.config.entity_id) {
                return Err(rejected("aud does not name this entity"));
            }
        }
        Ok(response)
    }
}

/// Provider metadata and registration endpoint, if explicit registration
/// is offered.
fn explicit_registration_endpoint(
    provider: &EntityStatement,
) -> Result<(OpenIdProviderMetadata, String), FederationError> {
    let unsupported = |reason: &str| FederationError::RegistrationNotSupported {
        reason: format!("{}: {reason}", provider.issuer_str()),
    };

    let metadata = provider
        .metadata
        .as_ref()
        .and_then(|m| m.openid_provider.clone())
        .ok_or_else(|| unsupported("no openid_provider metadata"))?;

    let explicit = ClientRegistrationType::Explicit.as_str();
    let offered = metadata
        .client_registration_types_supported
        .as_ref()
        .is_some_and(|types| types.iter().any(|t| t == explicit));
    if !offered {
        return Err(unsupported("explicit registration is not offered"));
    }

    let endpoint = metadata
        .federation_registration_endpoint
        .clone()
        .ok_or_else(|| unsupported("no federation_registration_endpoint"))?;
    Ok((metadata, endpoint))
}

fn rejected(reason: &str) -> FederationError {
    warn!(reason, "Registration response rejected");
    FederationError::InvalidRegistrationResponse {
        reason: reason.to_string(),
    }
}
