//! Explicit registration end to end.

use std::sync::Arc;
use std::time::Duration;

use fedtrust_core::jws;
use fedtrust_core::metadata::{Metadata, MetadataPolicy, RelyingPartyMetadata, RelyingPartyPolicy};
use fedtrust_core::policy::Policy;
use fedtrust_core::statement::{SignedStatement, StatementType};
use fedtrust_core::{
    ExplicitRegistrationService, FederationConfig, FederationError, ResolverConfig,
    TrustChainResolver,
};
use fedtrust_keyring::{KeyStatus, LocalKeyStore, SigningAlgorithm, StatementSigner};
use jsonwebtoken::jwk::JwkSet;

use crate::federation::{leaf_configuration, StaticFederation, TestEntity};

const ENTITY_STATEMENT: &str = "application/entity-statement+jwt";

struct Setup {
    service: ExplicitRegistrationService,
    op: TestEntity,
    rp: TestEntity,
    ta: TestEntity,
}

async fn setup() -> Setup {
    let ta = TestEntity::new("https://ta.example");
    let op = TestEntity::new("https://op.example");
    let rp = TestEntity::new("https://rp.example");

    let policy = MetadataPolicy {
        openid_relying_party: Some(RelyingPartyPolicy {
            application_type: Some(Policy::new().with_one_of(["web".to_string()])),
            client_uri: Some(Policy::new().with_default("https://rp.example/about".to_string())),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_subordinate(&ta, &rp, Some(policy)).await;

    let config = FederationConfig {
        entity_id: op.id.clone(),
        authority_hints: vec![ta.id.clone()],
        trust_anchors: vec![ta.id.clone()],
        federation_registration_endpoint: Some(format!("{}/federation/register", op.id)),
        signing_algorithm: SigningAlgorithm::EdDsa,
        ..Default::default()
    };

    let keys = LocalKeyStore::new();
    keys.insert(op.signer.clone(), KeyStatus::Active).unwrap();

    let resolver = TrustChainResolver::new(Arc::new(federation), ResolverConfig::default());
    let service = ExplicitRegistrationService::new(config, resolver, Arc::new(keys));

    Setup { service, op, rp, ta }
}

fn rp_metadata(application_type: &str) -> Metadata {
    Metadata {
        openid_relying_party: Some(RelyingPartyMetadata {
            client_name: Some("Example RP".into()),
            application_type: Some(application_type.into()),
            redirect_uris: Some(vec!["https://rp.example/cb".into()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn registration_returns_signed_response() {
    let setup = setup().await;
    let request = leaf_configuration(
        &setup.rp,
        &[&setup.ta],
        rp_metadata("web"),
        Some(setup.op.id.as_str()),
    );
    let body = setup.rp.sign(&request).await;

    let outcome = setup.service.register(ENTITY_STATEMENT, &body).await.unwrap();
    assert_eq!(outcome.leaf_id, "https://rp.example");
    assert_eq!(outcome.trust_anchor_id, "https://ta.example");
    assert_eq!(
        outcome.media_type,
        StatementType::ExplicitRegistrationResponse.media_type()
    );
    assert_eq!(outcome.client_metadata.client_id.as_deref(), Some("https://rp.example"));
    assert_eq!(
        outcome.client_metadata.client_uri.as_deref(),
        Some("https://rp.example/about")
    );
    assert_eq!(
        outcome.client_metadata.client_registration_types,
        Some(vec!["explicit".to_string()])
    );
    assert!(outcome.client_metadata.jwks.is_some());

    let op_keys = JwkSet {
        keys: vec![setup.op.signer.public_jwk().unwrap()],
    };
    jws::verify(
        &outcome.token,
        &op_keys,
        &[StatementType::ExplicitRegistrationResponse],
        Duration::from_secs(60),
    )
    .unwrap();

    let SignedStatement::RegistrationResponse(response) = jws::parse_typed(&outcome.token).unwrap()
    else {
        panic!("expected a registration response");
    };
    assert_eq!(response.trust_anchor_id.as_deref(), Some("https://ta.example"));
    assert_eq!(response.statement.issuer_str(), "https://op.example");
    assert_eq!(response.statement.subject_str(), "https://rp.example");
    assert_eq!(response.statement.authority_hints, vec!["https://ta.example".to_string()]);
    assert_eq!(response.statement.expires_at, request.expires_at);
}

#[tokio::test]
async fn metadata_violating_policy_is_rejected() {
    let setup = setup().await;
    let request = leaf_configuration(
        &setup.rp,
        &[&setup.ta],
        rp_metadata("native"),
        Some(setup.op.id.as_str()),
    );
    let body = setup.rp.sign(&request).await;

    let err = setup.service.register(ENTITY_STATEMENT, &body).await.unwrap_err();
    assert!(matches!(
        err,
        FederationError::PolicyViolation { ref claim, .. } if claim == "application_type"
    ));
}

#[tokio::test]
async fn request_for_another_provider_is_rejected() {
    let setup = setup().await;
    let request = leaf_configuration(
        &setup.rp,
        &[&setup.ta],
        rp_metadata("web"),
        Some("https://other-op.example"),
    );
    let body = setup.rp.sign(&request).await;

    let err = setup.service.register(ENTITY_STATEMENT, &body).await.unwrap_err();
    assert!(matches!(err, FederationError::InvalidRegistrationRequest { .. }));
}

#[tokio::test]
async fn rp_outside_federation_has_no_acceptable_chain() {
    let setup = setup().await;
    let stranger = TestEntity::new("https://stranger.example");
    let request = leaf_configuration(
        &stranger,
        &[&setup.ta],
        rp_metadata("web"),
        Some(setup.op.id.as_str()),
    );
    let body = stranger.sign(&request).await;

    let err = setup.service.register(ENTITY_STATEMENT, &body).await.unwrap_err();
    assert!(matches!(err, FederationError::NoAcceptableChain { .. }));
}

#[tokio::test]
async fn unsupported_media_type() {
    let setup = setup().await;
    let err = setup.service.register("application/json", "{}").await.unwrap_err();
    assert!(matches!(err, FederationError::UnsupportedMediaType { .. }));
}
