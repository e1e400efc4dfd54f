//! A Relying Party registering at a provider in the same federation.

use std::sync::Arc;

use async_trait::async_trait;
use fedtrust_core::jws::encode_and_sign;
use fedtrust_core::metadata::{
    Metadata, MetadataPolicy, OpenIdProviderMetadata, RelyingPartyMetadata, RelyingPartyPolicy,
};
use fedtrust_core::policy::Policy;
use fedtrust_core::statement::{Audience, EntityStatement, RegistrationResponse, StatementType};
use fedtrust_core::{
    ClientRegistrationType, EntityConfigurationBuilder, ExplicitRegistrationClient,
    ExplicitRegistrationService, FederationConfig, FederationError, FederationFetcher,
    FetchError, ResolverConfig, TrustChainResolver,
};
use fedtrust_keyring::{KeyStatus, LocalKeyStore, SigningAlgorithm};

use crate::federation::{StaticFederation, TestEntity};

enum Registrar {
    Service(ExplicitRegistrationService),
    Fixed(String),
}

/// The federation plus a provider answering registration posts at one endpoint.
struct ProviderRoute {
    federation: Arc<StaticFederation>,
    endpoint: String,
    registrar: Registrar,
}

#[async_trait]
impl FederationFetcher for ProviderRoute {
    async fn fetch_entity_configuration(&self, entity_id: &str) -> Result<String, FetchError> {
        self.federation.fetch_entity_configuration(entity_id).await
    }

    async fn fetch_subordinate_statement(
        &self,
        fetch_endpoint: &str,
        subject: &str,
    ) -> Result<String, FetchError> {
        self.federation
            .fetch_subordinate_statement(fetch_endpoint, subject)
            .await
    }

    async fn post_registration(
        &self,
        registration_endpoint: &str,
        media_type: &str,
        body: &str,
    ) -> Result<String, FetchError> {
        let url = registration_endpoint.to_string();
        if registration_endpoint != self.endpoint {
            return Err(FetchError::Status { url, status: 404 });
        }
        match &self.registrar {
            Registrar::Service(service) => service
                .register(media_type, body)
                .await
                .map(|outcome| outcome.token)
                .map_err(|_| FetchError::Status { url, status: 400 }),
            Registrar::Fixed(token) => Ok(token.clone()),
        }
    }
}

struct Parties {
    ta: TestEntity,
    op: TestEntity,
    rp: TestEntity,
    federation: Arc<StaticFederation>,
    op_config: FederationConfig,
}

impl Parties {
    async fn new(registration_types: Vec<ClientRegistrationType>) -> Self {
        let ta = TestEntity::new("https://ta.example");
        let op = TestEntity::new("https://op.example");
        let rp = TestEntity::new("https://rp.example");

        let op_config = FederationConfig {
            entity_id: op.id.clone(),
            authority_hints: vec![ta.id.clone()],
            trust_anchors: vec![ta.id.clone()],
            client_registration_types: registration_types,
            federation_registration_endpoint: Some(format!("{}/federation/register", op.id)),
            signing_algorithm: SigningAlgorithm::EdDsa,
            ..Default::default()
        };
        let op_statement = EntityConfigurationBuilder::new(op_config.clone())
            .with_jwks(op.jwks())
            .with_openid_provider(OpenIdProviderMetadata {
                issuer: Some(op.id.clone()),
                ..Default::default()
            })
            .build(chrono::Utc::now().timestamp() - 10);

        let rp_policy = MetadataPolicy {
            openid_relying_party: Some(RelyingPartyPolicy {
                application_type: Some(Policy::new().with_one_of(["web".to_string()])),
                client_uri: Some(
                    Policy::new().with_default("https://rp.example/about".to_string()),
                ),
                ..Default::default()
            }),
            ..Default::default()
        };

        let mut federation = StaticFederation::new();
        federation.publish_configuration(&ta, &[]).await;
        federation.publish_statement(&op, &op_statement).await;
        federation.publish_subordinate(&ta, &op, None).await;
        federation.publish_subordinate(&ta, &rp, Some(rp_policy)).await;

        Self {
            ta,
            op,
            rp,
            federation: Arc::new(federation),
            op_config,
        }
    }

    fn registration_endpoint(&self) -> String {
        format!("{}/federation/register", self.op.id)
    }

    fn service(&self) -> ExplicitRegistrationService {
        let keys = LocalKeyStore::new();
        keys.insert(self.op.signer.clone(), KeyStatus::Active).unwrap();
        let resolver =
            TrustChainResolver::new(self.federation.clone(), ResolverConfig::default());
        ExplicitRegistrationService::new(self.op_config.clone(), resolver, Arc::new(keys))
    }

    fn client(&self, registrar: Registrar) -> ExplicitRegistrationClient {
        let route = ProviderRoute {
            federation: Arc::clone(&self.federation),
            endpoint: self.registration_endpoint(),
            registrar,
        };
        let config = FederationConfig {
            entity_id: self.rp.id.clone(),
            authority_hints: vec![self.ta.id.clone()],
            trust_anchors: vec![self.ta.id.clone()],
            signing_algorithm: SigningAlgorithm::EdDsa,
            ..Default::default()
        };
        let keys = LocalKeyStore::new();
        keys.insert(self.rp.signer.clone(), KeyStatus::Active).unwrap();
        ExplicitRegistrationClient::new(config, Arc::new(route), Arc::new(keys))
    }
}

fn client_metadata(application_type: &str) -> RelyingPartyMetadata {
    RelyingPartyMetadata {
        client_name: Some("Example RP".into()),
        application_type: Some(application_type.into()),
        redirect_uris: Some(vec!["https://rp.example/cb".into()]),
        ..Default::default()
    }
}

#[tokio::test]
async fn client_registers_with_provider_service() {
    let parties = Parties::new(vec![ClientRegistrationType::Explicit]).await;
    let client = parties.client(Registrar::Service(parties.service()));

    let registration = client
        .register(&parties.op.id, &parties.ta.id, client_metadata("web"))
        .await
        .unwrap();

    assert_eq!(registration.client_id, "https://rp.example");
    assert_eq!(registration.trust_anchor_id, "https://ta.example");
    assert_eq!(registration.authority_hints, vec!["https://ta.example".to_string()]);
    assert!(registration.client_secret.is_none());
    assert!(registration.expires_at.is_some());

    // Policy from the anchor's statement about the RP was applied.
    assert_eq!(
        registration.client_metadata.client_uri.as_deref(),
        Some("https://rp.example/about")
    );
    assert_eq!(
        registration.client_metadata.client_registration_types,
        Some(vec!["explicit".to_string()])
    );
    assert!(registration.client_metadata.jwks.is_some());

    assert_eq!(
        registration.provider.federation_registration_endpoint,
        Some(parties.registration_endpoint())
    );
    assert_eq!(registration.provider_chain.len(), 3);
    assert_eq!(registration.provider_chain.leaf_id, "https://op.example");
    assert_eq!(registration.provider_chain.trust_anchor_id, "https://ta.example");
}

#[tokio::test]
async fn provider_without_explicit_registration_is_not_contacted() {
    let parties = Parties::new(vec![ClientRegistrationType::Automatic]).await;
    let client = parties.client(Registrar::Fixed("never-sent".into()));

    let err = client
        .register(&parties.op.id, &parties.ta.id, client_metadata("web"))
        .await
        .unwrap_err();
    assert!(matches!(err, FederationError::RegistrationNotSupported { .. }));
}

#[tokio::test]
async fn provider_under_another_anchor_has_no_chain() {
    let parties = Parties::new(vec![ClientRegistrationType::Explicit]).await;
    let client = parties.client(Registrar::Service(parties.service()));

    let err = client
        .register(&parties.op.id, "https://other-ta.example", client_metadata("web"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FederationError::NoAcceptableChain { ref entity_id } if entity_id == "https://op.example"
    ));
}

#[tokio::test]
async fn provider_refusal_is_reported() {
    let parties = Parties::new(vec![ClientRegistrationType::Explicit]).await;
    let client = parties.client(Registrar::Service(parties.service()));

    let err = client
        .register(&parties.op.id, &parties.ta.id, client_metadata("native"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FederationError::Fetch(FetchError::Status { status: 400, .. })
    ));
}

#[tokio::test]
async fn response_signed_by_another_key_is_rejected() {
    let parties = Parties::new(vec![ClientRegistrationType::Explicit]).await;
    let impostor = TestEntity::new("https://op.example");

    let now = chrono::Utc::now().timestamp();
    let forged = RegistrationResponse {
        statement: EntityStatement {
            issuer: Some(parties.op.id.clone()),
            subject: Some(parties.rp.id.clone()),
            issued_at: Some(now),
            expires_at: Some(now + 3_600),
            audience: Some(Audience::One(parties.rp.id.clone())),
            authority_hints: vec![parties.ta.id.clone()],
            jwks: None,
            metadata: Some(Metadata {
                openid_relying_party: Some(client_metadata("web")),
                ..Default::default()
            }),
            metadata_policy: None,
        },
        trust_anchor_id: Some(parties.ta.id.clone()),
    };
    let token = encode_and_sign(
        &forged,
        StatementType::ExplicitRegistrationResponse,
        impostor.signer.as_ref(),
    )
    .await
    .unwrap();

    let client = parties.client(Registrar::Fixed(token));
    let err = client
        .register(&parties.op.id, &parties.ta.id, client_metadata("web"))
        .await
        .unwrap_err();
    assert!(matches!(err, FederationError::InvalidRegistrationResponse { .. }));
}
