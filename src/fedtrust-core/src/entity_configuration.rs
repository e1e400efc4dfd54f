//! This entity's own self-signed entity configuration.

use fedtrust_keyring::LocalKeyStore;
use jsonwebtoken::jwk::JwkSet;

use crate::config::FederationConfig;
use crate::error::FederationError;
use crate::jws;
use crate::metadata::{
    CommonMetadata, FederationEntityMetadata, Metadata, OpenIdProviderMetadata,
    RelyingPartyMetadata,
};
use crate::statement::{Audience, EntityStatement, StatementType};

/// Builds the statement served at `/.well-known/openid-federation`.
#[derive(Debug, Clone)]
pub struct EntityConfigurationBuilder {
    config: FederationConfig,
    jwks: JwkSet,
    openid_provider: Option<OpenIdProviderMetadata>,
    relying_party: Option<RelyingPartyMetadata>,
    audience: Option<String>,
}

impl EntityConfigurationBuilder {
    /// Start from configuration; keys come from [`with_key_store`](Self::with_key_store)
    /// or [`with_jwks`](Self::with_jwks).
    pub fn new(config: FederationConfig) -> Self {
        Self {
            config,
            jwks: JwkSet { keys: Vec::new() },
            openid_provider: None,
            relying_party: None,
            audience: None,
        }
    }

    /// Publish the store's enabled keys for the configured algorithm.
    pub fn with_key_store(mut self, keys: &LocalKeyStore) -> Result<Self, FederationError> {
        self.jwks = keys.local_key_set(self.config.signing_algorithm)?;
        Ok(self)
    }

    /// Publish an explicit key set.
    pub fn with_jwks(mut self, jwks: JwkSet) -> Self {
        self.jwks = jwks;
        self
    }

    /// Declare OpenID Provider metadata (endpoints, supported values).
    pub fn with_openid_provider(mut self, metadata: OpenIdProviderMetadata) -> Self {
        self.openid_provider = Some(metadata);
        self
    }

    /// Declare Relying Party metadata (client name, redirect URIs, grants).
    pub fn with_relying_party(mut self, metadata: RelyingPartyMetadata) -> Self {
        self.relying_party = Some(metadata);
        self
    }

    /// Address the statement to one entity, as a registration request is.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Assemble the unsigned statement, issued at `now`.
    pub fn build(&self, now: i64) -> EntityStatement {
        let config = &self.config;
        let common = CommonMetadata {
            organization_name: config.organization_name.clone(),
            organization_uri: config.organization_uri.clone(),
            homepage_uri: config.homepage_uri.clone(),
            signed_jwks_uri: None,
        };
        let contacts = (!config.contacts.is_empty()).then(|| config.contacts.clone());

        let openid_provider = self.openid_provider.clone().map(|mut op| {
            op.client_registration_types_supported = Some(
                config
                    .client_registration_types
                    .iter()
                    .map(|t| t.as_str().to_string())
                    .collect(),
            );
            if config.supports_explicit_registration() {
                op.federation_registration_endpoint =
                    config.federation_registration_endpoint.clone();
            }
            op.contacts = op.contacts.or_else(|| contacts.clone());
            op.logo_uri = op.logo_uri.or_else(|| config.logo_uri.clone());
            op.policy_uri = op.policy_uri.or_else(|| config.policy_uri.clone());
            op.common = common.clone();
            op
        });

        let openid_relying_party = self.relying_party.clone().map(|mut rp| {
            rp.client_registration_types = rp.client_registration_types.or_else(|| {
                Some(
                    config
                        .client_registration_types
                        .iter()
                        .map(|t| t.as_str().to_string())
                        .collect(),
                )
            });
            rp.contacts = rp.contacts.or_else(|| contacts.clone());
            rp.logo_uri = rp.logo_uri.or_else(|| config.logo_uri.clone());
            rp.policy_uri = rp.policy_uri.or_else(|| config.policy_uri.clone());
            rp.common = common.clone();
            rp
        });

        let federation_entity = FederationEntityMetadata {
            federation_fetch_endpoint: config.federation_fetch_endpoint.clone(),
            federation_resolve_endpoint: config.federation_resolve_endpoint.clone(),
            federation_historical_keys_endpoint: config.federation_historical_keys_endpoint.clone(),
            contacts,
            logo_uri: config.logo_uri.clone(),
            policy_uri: config.policy_uri.clone(),
            common,
            ..Default::default()
        };

        EntityStatement {
            issuer: Some(config.entity_id.clone()),
            subject: Some(config.entity_id.clone()),
            issued_at: Some(now),
            expires_at: Some(now.saturating_add(config.lifespan_secs)),
            audience: self.audience.clone().map(Audience::One),
            authority_hints: config.authority_hints.clone(),
            jwks: Some(self.jwks.clone()),
            metadata: Some(Metadata {
                openid_provider,
                openid_relying_party,
                federation_entity: (!federation_entity.is_empty()).then_some(federation_entity),
            }),
            metadata_policy: None,
        }
    }

    /// Build and sign with the store's active key for the configured
    /// algorithm.
    pub async fn sign(&self, keys: &LocalKeyStore, now: i64) -> Result<String, FederationError> {
        let signer = keys.active_signer(self.config.signing_algorithm)?;
        let statement = self.build(now);
        jws::encode_and_sign(&statement, StatementType::EntityStatement, signer.as_ref()).await
    }
}
