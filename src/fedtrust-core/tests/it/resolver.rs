//! Trust chain discovery over an in-memory federation.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use fedtrust_core::combiner::select_acceptable_chain;
use fedtrust_core::metadata::{Metadata, MetadataPolicy, RelyingPartyMetadata, RelyingPartyPolicy};
use fedtrust_core::policy::{Policy, PolicyList};
use fedtrust_core::{FederationError, ResolverConfig, TrustChainResolver};

use crate::federation::{leaf_configuration, StaticFederation, TestEntity};

fn anchors(entities: &[&TestEntity]) -> BTreeSet<String> {
    entities.iter().map(|e| e.id.clone()).collect()
}

fn resolver(federation: StaticFederation) -> TrustChainResolver {
    TrustChainResolver::new(Arc::new(federation), ResolverConfig::default())
}

fn rp_metadata(grant_types: &[&str]) -> Metadata {
    Metadata {
        openid_relying_party: Some(RelyingPartyMetadata {
            client_name: Some("Example RP".into()),
            grant_types: Some(grant_types.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn rp_policy(policy: RelyingPartyPolicy) -> Option<MetadataPolicy> {
    Some(MetadataPolicy {
        openid_relying_party: Some(policy),
        ..Default::default()
    })
}

fn client_name_value(name: &str) -> Option<MetadataPolicy> {
    rp_policy(RelyingPartyPolicy {
        client_name: Some(Policy::new().with_value(name.to_string())),
        ..Default::default()
    })
}

#[tokio::test]
async fn leaf_through_intermediate_to_anchor() {
    let ta = TestEntity::new("https://ta.example");
    let ia = TestEntity::new("https://ia.example");
    let rp = TestEntity::new("https://rp.example");

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_configuration(&ia, &[&ta]).await;
    federation.publish_subordinate(&ta, &ia, None).await;
    federation.publish_subordinate(&ia, &rp, None).await;

    let leaf = leaf_configuration(&rp, &[&ia], rp_metadata(&["authorization_code"]), None);
    let chains = resolver(federation)
        .resolve_trust_chains(&leaf, &anchors(&[&ta]), true)
        .await;

    assert_eq!(chains.len(), 1);
    let chain = &chains[0];
    assert_eq!(chain.len(), 4);
    assert_eq!(chain.leaf_id, "https://rp.example");
    assert_eq!(chain.trust_anchor_id, "https://ta.example");
    assert_eq!(chain.immediate_superior(), Some("https://ia.example"));

    let pairs: Vec<(&str, &str)> = chain
        .statements
        .iter()
        .map(|s| (s.issuer_str(), s.subject_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("https://rp.example", "https://rp.example"),
            ("https://ia.example", "https://rp.example"),
            ("https://ta.example", "https://ia.example"),
            ("https://ta.example", "https://ta.example"),
        ]
    );
}

#[tokio::test]
async fn resolve_from_url_fetches_and_verifies_leaf() {
    let ta = TestEntity::new("https://ta.example");
    let rp = TestEntity::new("https://rp.example");

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_subordinate(&ta, &rp, None).await;
    let leaf = leaf_configuration(&rp, &[&ta], rp_metadata(&[]), None);
    federation.publish_statement(&rp, &leaf).await;

    let (statement, chains) = resolver(federation)
        .resolve_from_url("https://rp.example", &anchors(&[&ta]), false)
        .await
        .unwrap();
    assert_eq!(statement.issuer_str(), "https://rp.example");
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].len(), 3);
}

#[tokio::test]
async fn resolve_from_url_unknown_entity_is_fetch_error() {
    let err = resolver(StaticFederation::new())
        .resolve_from_url("https://nobody.example", &BTreeSet::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, FederationError::Fetch(_)));
    assert!(err.is_branch_local());
}

#[tokio::test]
async fn anchor_as_leaf_yields_single_chain() {
    let ta = TestEntity::new("https://ta.example");
    let statement = ta.configuration(&[], None);

    let chains = resolver(StaticFederation::new())
        .resolve_trust_chains(&statement, &anchors(&[&ta]), true)
        .await;
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].len(), 1);
}

#[tokio::test]
async fn cyclic_hints_terminate_without_chains() {
    let a = TestEntity::new("https://a.example");
    let b = TestEntity::new("https://b.example");
    let rp = TestEntity::new("https://rp.example");
    let ta = TestEntity::new("https://ta.example");

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&a, &[&b]).await;
    federation.publish_configuration(&b, &[&a]).await;
    federation.publish_subordinate(&a, &rp, None).await;
    federation.publish_subordinate(&b, &a, None).await;
    federation.publish_subordinate(&a, &b, None).await;

    let leaf = leaf_configuration(&rp, &[&a], rp_metadata(&[]), None);
    let chains = resolver(federation)
        .resolve_trust_chains(&leaf, &anchors(&[&ta]), false)
        .await;
    assert!(chains.is_empty());
}

#[tokio::test]
async fn visited_anchor_is_reached_again() {
    let ta = TestEntity::new("https://ta.example");
    let ia = TestEntity::new("https://ia.example");

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_configuration(&ia, &[&ta]).await;
    federation.publish_subordinate(&ia, &ta, None).await;
    federation.publish_subordinate(&ta, &ia, None).await;

    // The anchor starts the path, so it is already visited when IA hints back to it.
    let leaf = ta.configuration(&[&ia], None);
    let chains = resolver(federation)
        .resolve_trust_chains(&leaf, &anchors(&[&ta]), true)
        .await;

    assert_eq!(chains.len(), 1);
    let chain = &chains[0];
    assert_eq!(chain.leaf_id, "https://ta.example");
    assert_eq!(chain.trust_anchor_id, "https://ta.example");
    let pairs: Vec<(&str, &str)> = chain
        .statements
        .iter()
        .map(|s| (s.issuer_str(), s.subject_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("https://ta.example", "https://ta.example"),
            ("https://ia.example", "https://ta.example"),
            ("https://ta.example", "https://ia.example"),
            ("https://ta.example", "https://ta.example"),
        ]
    );
}

#[tokio::test]
async fn anchor_reached_on_two_paths_keeps_hint_order() {
    let ta = TestEntity::new("https://ta.example");
    let ia = TestEntity::new("https://ia.example");
    let rp = TestEntity::new("https://rp.example");

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_configuration(&ia, &[&ta]).await;
    federation.publish_subordinate(&ta, &ia, None).await;
    federation.publish_subordinate(&ia, &rp, None).await;
    federation.publish_subordinate(&ta, &rp, None).await;

    let leaf = leaf_configuration(&rp, &[&ia, &ta], rp_metadata(&[]), None);
    let chains = resolver(federation)
        .resolve_trust_chains(&leaf, &anchors(&[&ta]), true)
        .await;

    assert_eq!(chains.len(), 2);
    assert_eq!(chains[0].len(), 4);
    assert_eq!(chains[0].immediate_superior(), Some("https://ia.example"));
    assert_eq!(chains[1].len(), 3);
    assert_eq!(chains[1].immediate_superior(), Some("https://ta.example"));
    assert!(chains.iter().all(|c| c.trust_anchor_id == "https://ta.example"));
}

#[tokio::test]
async fn failing_sibling_does_not_abort_search() {
    let ta = TestEntity::new("https://ta.example");
    let ia = TestEntity::new("https://ia.example");
    let ghost = TestEntity::new("https://ghost.example");
    let rp = TestEntity::new("https://rp.example");

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_configuration(&ia, &[&ta]).await;
    federation.publish_subordinate(&ta, &ia, None).await;
    federation.publish_subordinate(&ia, &rp, None).await;

    let leaf = leaf_configuration(&rp, &[&ghost, &ia], rp_metadata(&[]), None);
    let chains = resolver(federation)
        .resolve_trust_chains(&leaf, &anchors(&[&ta]), false)
        .await;
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].immediate_superior(), Some("https://ia.example"));
}

#[tokio::test]
async fn subordinate_signed_by_wrong_key_is_dropped() {
    let ta = TestEntity::new("https://ta.example");
    let impostor = TestEntity::new("https://ta.example");
    let rp = TestEntity::new("https://rp.example");

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_subordinate(&impostor, &rp, None).await;

    let leaf = leaf_configuration(&rp, &[&ta], rp_metadata(&[]), None);
    let chains = resolver(federation)
        .resolve_trust_chains(&leaf, &anchors(&[&ta]), false)
        .await;
    assert!(chains.is_empty());
}

#[tokio::test]
async fn slow_branch_times_out_and_is_dropped() {
    let ta = TestEntity::new("https://ta.example");
    let slow = TestEntity::new("https://slow.example");
    let rp = TestEntity::new("https://rp.example");

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_configuration(&slow, &[&ta]).await;
    federation.publish_subordinate(&ta, &slow, None).await;
    federation.publish_subordinate(&slow, &rp, None).await;
    federation.publish_subordinate(&ta, &rp, None).await;
    federation.delay_configuration(&slow, Duration::from_secs(30));

    let config = ResolverConfig {
        fetch_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let resolver = TrustChainResolver::new(Arc::new(federation), config);

    let leaf = leaf_configuration(&rp, &[&slow, &ta], rp_metadata(&[]), None);
    let chains = resolver
        .resolve_trust_chains(&leaf, &anchors(&[&ta]), false)
        .await;
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].len(), 3);
}

#[tokio::test]
async fn max_chain_length_bounds_discovery() {
    let ta = TestEntity::new("https://ta.example");
    let ia = TestEntity::new("https://ia.example");
    let rp = TestEntity::new("https://rp.example");

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_configuration(&ia, &[&ta]).await;
    federation.publish_subordinate(&ta, &ia, None).await;
    federation.publish_subordinate(&ia, &rp, None).await;

    let config = ResolverConfig {
        max_chain_length: 3,
        ..Default::default()
    };
    let resolver = TrustChainResolver::new(Arc::new(federation), config);

    let leaf = leaf_configuration(&rp, &[&ia], rp_metadata(&[]), None);
    let chains = resolver
        .resolve_trust_chains(&leaf, &anchors(&[&ta]), false)
        .await;
    assert!(chains.is_empty());
}

#[tokio::test]
async fn conflicting_chain_is_discarded_and_next_selected() {
    let ta = TestEntity::new("https://ta.example");
    let ia1 = TestEntity::new("https://ia1.example");
    let ia2 = TestEntity::new("https://ia2.example");
    let rp = TestEntity::new("https://rp.example");

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_configuration(&ia1, &[&ta]).await;
    federation.publish_configuration(&ia2, &[&ta]).await;
    federation
        .publish_subordinate(&ta, &ia1, client_name_value("Federation RP"))
        .await;
    federation
        .publish_subordinate(&ia1, &rp, client_name_value("Intermediate RP"))
        .await;
    federation
        .publish_subordinate(&ta, &ia2, client_name_value("Federation RP"))
        .await;
    federation.publish_subordinate(&ia2, &rp, None).await;

    let declared = rp_metadata(&["authorization_code"]);
    let leaf = leaf_configuration(&rp, &[&ia1, &ia2], declared.clone(), None);
    let chains = resolver(federation)
        .resolve_trust_chains(&leaf, &anchors(&[&ta]), true)
        .await;
    assert_eq!(chains.len(), 1);

    let accepted = select_acceptable_chain(chains, &declared).unwrap();
    assert_eq!(accepted.chain.immediate_superior(), Some("https://ia2.example"));
    let rp_metadata = accepted.metadata.openid_relying_party.unwrap();
    assert_eq!(rp_metadata.client_name.as_deref(), Some("Federation RP"));
}

#[tokio::test]
async fn policy_is_enforced_on_leaf_metadata() {
    let ta = TestEntity::new("https://ta.example");
    let ia = TestEntity::new("https://ia.example");
    let rp = TestEntity::new("https://rp.example");

    let ta_policy = rp_policy(RelyingPartyPolicy {
        grant_types: Some(
            PolicyList::new().with_subset_of([
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ]),
        ),
        ..Default::default()
    });
    let ia_policy = rp_policy(RelyingPartyPolicy {
        scope: Some(Policy::new().with_default("openid".to_string())),
        ..Default::default()
    });

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_configuration(&ia, &[&ta]).await;
    federation.publish_subordinate(&ta, &ia, ta_policy).await;
    federation.publish_subordinate(&ia, &rp, ia_policy).await;

    let leaf = leaf_configuration(
        &rp,
        &[&ia],
        rp_metadata(&["authorization_code", "implicit"]),
        None,
    );
    let accepted = resolver(federation)
        .resolve_metadata(&leaf, &anchors(&[&ta]))
        .await
        .unwrap();

    let effective = accepted.metadata.openid_relying_party.unwrap();
    assert_eq!(effective.grant_types, Some(vec!["authorization_code".to_string()]));
    assert_eq!(effective.scope.as_deref(), Some("openid"));
}

#[tokio::test]
async fn unsatisfiable_single_chain_reports_violation() {
    let ta = TestEntity::new("https://ta.example");
    let rp = TestEntity::new("https://rp.example");

    let policy = rp_policy(RelyingPartyPolicy {
        grant_types: Some(PolicyList::new().with_superset_of(["refresh_token".to_string()])),
        ..Default::default()
    });

    let mut federation = StaticFederation::new();
    federation.publish_configuration(&ta, &[]).await;
    federation.publish_subordinate(&ta, &rp, policy).await;

    let leaf = leaf_configuration(&rp, &[&ta], rp_metadata(&["authorization_code"]), None);
    let err = resolver(federation)
        .resolve_metadata(&leaf, &anchors(&[&ta]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FederationError::PolicyViolation { ref claim, .. } if claim == "grant_types"
    ));
}

#[tokio::test]
async fn unreachable_anchor_is_no_acceptable_chain() {
    let ta = TestEntity::new("https://ta.example");
    let rp = TestEntity::new("https://rp.example");

    let leaf = leaf_configuration(&rp, &[&ta], rp_metadata(&[]), None);
    let err = resolver(StaticFederation::new())
        .resolve_metadata(&leaf, &anchors(&[&ta]))
        .await
        .unwrap_err();
    assert!(matches!(err, FederationError::NoAcceptableChain { .. }));
    assert!(err.is_terminal());
}
