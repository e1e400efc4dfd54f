//! Trust chain discovery.
//!
//! Starting from a leaf statement, every authority hint is explored as an
//! independent branch: fetch the superior's entity configuration, verify it
//! self-signed, fetch the superior's statement about the current entity,
//! verify it with the superior's keys, then either stop at a trust anchor or
//! recurse. Sibling branches run concurrently; results keep declared hint
//! order.
//!
//! A resolved chain is ordered leaf to anchor:
//!
//! ```text
//! [ leaf configuration, sub(IA1 → leaf), sub(IA2 → IA1), ..., sub(TA → IAn), TA configuration ]
//! ```

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::combiner::{fold_chain_policy, require_acceptable_chain, AcceptedChain};
use crate::config::ResolverConfig;
use crate::error::FederationError;
use crate::fetch::{FederationFetcher, FetchError};
use crate::jws;
use crate::metadata::{Metadata, MetadataPolicy};
use crate::policy::PolicyError;
use crate::statement::{EntityStatement, StatementType};

/// One verified path from a leaf to a trust anchor.
#[derive(Debug, Clone, Serialize)]
pub struct TrustChain {
    /// Parsed statements, leaf first, anchor configuration last.
    pub statements: Vec<EntityStatement>,
    /// Folded metadata policy, when requested and any was published.
    pub combined_policy: Option<MetadataPolicy>,
    /// Issuer of the last statement.
    pub trust_anchor_id: String,
    /// Issuer of the first statement.
    pub leaf_id: String,
}

impl TrustChain {
    /// Build from an ordered statement list, folding policies if asked.
    pub fn assemble(
        statements: Vec<EntityStatement>,
        policy_required: bool,
    ) -> Result<Self, PolicyError> {
        let combined_policy = if policy_required {
            fold_chain_policy(&statements)?
        } else {
            None
        };

        let leaf_id = statements
            .first()
            .map(|s| s.issuer_str().to_string())
            .unwrap_or_default();
        let trust_anchor_id = statements
            .last()
            .map(|s| s.issuer_str().to_string())
            .unwrap_or_default();

        Ok(Self {
            statements,
            combined_policy,
            trust_anchor_id,
            leaf_id,
        })
    }

    /// Number of statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the chain holds no statement.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Entity the leaf reached the anchor through, if not the anchor itself.
    pub fn immediate_superior(&self) -> Option<&str> {
        self.statements.get(1).and_then(|s| s.issuer.as_deref())
    }
}

/// Outcome of exploring one authority hint.
#[derive(Debug)]
enum Branch {
    /// Paths from the hint up to an anchor, each starting with the hint's
    /// statement about the entity below it.
    Found(Vec<Vec<EntityStatement>>),
    /// Branch dropped.
    Skipped { hint: String, reason: String },
}

impl Branch {
    fn skipped(hint: &str, reason: impl Into<String>) -> Self {
        Self::Skipped {
            hint: hint.to_string(),
            reason: reason.into(),
        }
    }
}

/// Discovers trust chains over a [`FederationFetcher`].
pub struct TrustChainResolver {
    fetcher: Arc<dyn FederationFetcher>,
    config: ResolverConfig,
}

impl TrustChainResolver {
    /// Create a resolver.
    pub fn new(fetcher: Arc<dyn FederationFetcher>, config: ResolverConfig) -> Self {
        Self { fetcher, config }
    }

    /// Resolver settings.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Discover all chains from an already verified leaf statement.
    ///
    /// Chains whose policies conflict are dropped when `policy_required`.
    #[instrument(skip_all, fields(leaf = %leaf.issuer_str()))]
    pub async fn resolve_trust_chains(
        &self,
        leaf: &EntityStatement,
        trust_anchors: &BTreeSet<String>,
        policy_required: bool,
    ) -> Vec<TrustChain> {
        let Some(leaf_id) = leaf.issuer.as_deref() else {
            warn!("Leaf statement has no issuer");
            return Vec::new();
        };

        let paths: Vec<Vec<EntityStatement>> = if leaf.authority_hints.is_empty() {
            if trust_anchors.contains(leaf_id) {
                vec![vec![leaf.clone()]]
            } else {
                debug!("Leaf has no authority hints and is not a trust anchor");
                Vec::new()
            }
        } else {
            self.discover(leaf, trust_anchors, BTreeSet::new(), 1)
                .await
                .into_iter()
                .map(|upper| prepend(leaf.clone(), upper))
                .collect()
        };

        let chains: Vec<TrustChain> = paths
            .into_iter()
            .filter_map(|statements| match TrustChain::assemble(statements, policy_required) {
                Ok(chain) => Some(chain),
                Err(e) => {
                    warn!(error = %e, "Trust chain discarded");
                    None
                },
            })
            .collect();

        info!(chains = chains.len(), "Trust chain resolution complete");
        chains
    }

    /// Fetch, verify and resolve the entity at `leaf_entity_id`.
    ///
    /// Returns the leaf's entity configuration with its chains.
    #[instrument(skip(self, trust_anchors))]
    pub async fn resolve_from_url(
        &self,
        leaf_entity_id: &str,
        trust_anchors: &BTreeSet<String>,
        policy_required: bool,
    ) -> Result<(EntityStatement, Vec<TrustChain>), FederationError> {
        let leaf = self.fetch_verified_configuration(leaf_entity_id).await?;
        let chains = self
            .resolve_trust_chains(&leaf, trust_anchors, policy_required)
            .await;
        Ok((leaf, chains))
    }

    /// Fetch `entity_id`'s entity configuration, verify it with its own keys
    /// and check that it is current and about `entity_id`.
    pub async fn fetch_verified_configuration(
        &self,
        entity_id: &str,
    ) -> Result<EntityStatement, FederationError> {
        let token = self
            .with_deadline(entity_id, self.fetcher.fetch_entity_configuration(entity_id))
            .await?;
        let statement = jws::parse_and_verify_self_signed(&token, self.config.clock_skew)?;
        jws::validate_fields(
            &statement,
            entity_id,
            entity_id,
            Utc::now().timestamp(),
            self.config.clock_skew,
        )?;
        Ok(statement)
    }

    /// Resolve chains for `leaf` and apply the first acceptable one to the
    /// leaf's declared metadata.
    pub async fn resolve_metadata(
        &self,
        leaf: &EntityStatement,
        trust_anchors: &BTreeSet<String>,
    ) -> Result<AcceptedChain, FederationError> {
        let chains = self.resolve_trust_chains(leaf, trust_anchors, true).await;
        let declared = leaf.metadata.clone().unwrap_or_default();
        require_acceptable_chain(chains, &declared, leaf.issuer_str())
    }

    /// Explore every authority hint of `current`.
    ///
    /// `visited` is this branch's own copy; `chain_len` counts the statements
    /// already on the path, leaf included.
    fn discover<'a>(
        &'a self,
        current: &'a EntityStatement,
        trust_anchors: &'a BTreeSet<String>,
        mut visited: BTreeSet<String>,
        chain_len: usize,
    ) -> BoxFuture<'a, Vec<Vec<EntityStatement>>> {
        async move {
            let current_id = current.issuer_str().to_string();
            visited.insert(current_id.clone());

            let branches = current.authority_hints.iter().map(|hint| {
                self.explore_hint(&current_id, hint, trust_anchors, visited.clone(), chain_len)
            });
            let outcomes = join_all(branches).await;

            let mut paths = Vec::new();
            for outcome in outcomes {
                match outcome {
                    Branch::Found(found) => paths.extend(found),
                    Branch::Skipped { hint, reason } => {
                        warn!(
                            entity_id = %current_id,
                            hint = %hint,
                            reason = %reason,
                            "Authority hint skipped"
                        );
                    },
                }
            }
            paths
        }
        .boxed()
    }

    async fn explore_hint(
        &self,
        subject_id: &str,
        hint: &str,
        trust_anchors: &BTreeSet<String>,
        visited: BTreeSet<String>,
        chain_len: usize,
    ) -> Branch {
        let is_anchor = trust_anchors.contains(hint);

        // Anchors terminate regardless of prior visits.
        if visited.contains(hint) && !is_anchor {
            return Branch::skipped(hint, "already visited on this path");
        }
        // Subordinate statement plus at least the anchor's configuration.
        if chain_len + 2 > self.config.max_chain_length {
            return Branch::skipped(
                hint,
                format!("chain would exceed {} statements", self.config.max_chain_length),
            );
        }

        let (subordinate, configuration) = match self.verify_superior(subject_id, hint).await {
            Ok(pair) => pair,
            Err(e) => return Branch::skipped(hint, e.to_string()),
        };

        if is_anchor {
            debug!(hint = %hint, "Reached trust anchor");
            return Branch::Found(vec![vec![subordinate, configuration]]);
        }

        let upper = self
            .discover(&configuration, trust_anchors, visited, chain_len + 1)
            .await;
        if upper.is_empty() {
            return Branch::skipped(hint, "no trust anchor reachable");
        }

        Branch::Found(
            upper
                .into_iter()
                .map(|path| prepend(subordinate.clone(), path))
                .collect(),
        )
    }

    /// Fetch and verify `hint`'s configuration and its statement about
    /// `subject_id`.
    async fn verify_superior(
        &self,
        subject_id: &str,
        hint: &str,
    ) -> Result<(EntityStatement, EntityStatement), FederationError> {
        let skew = self.config.clock_skew;
        let now = Utc::now().timestamp();

        let token = self
            .with_deadline(hint, self.fetcher.fetch_entity_configuration(hint))
            .await?;
        let configuration = jws::parse_and_verify_self_signed(&token, skew)?;
        jws::validate_fields(&configuration, hint, hint, now, skew)?;

        let fetch_endpoint = configuration
            .metadata
            .as_ref()
            .and_then(Metadata::federation_fetch_endpoint)
            .ok_or_else(|| {
                FederationError::malformed(format!("{hint} declares no federation_fetch_endpoint"))
            })?;

        let token = self
            .with_deadline(
                fetch_endpoint,
                self.fetcher
                    .fetch_subordinate_statement(fetch_endpoint, subject_id),
            )
            .await?;
        let subordinate = jws::parse(&token)?;
        let jwks = configuration
            .jwks
            .as_ref()
            .ok_or_else(|| FederationError::signature(format!("{hint} publishes no jwks")))?;
        jws::verify(&token, jwks, &[StatementType::EntityStatement], skew)?;
        jws::validate_fields(&subordinate, hint, subject_id, now, skew)?;

        Ok((subordinate, configuration))
    }

    pub(crate) async fn with_deadline<F>(
        &self,
        url: &str,
        fetch: F,
    ) -> Result<String, FetchError>
    where
        F: Future<Output = Result<String, FetchError>>,
    {
        match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url = %url, after = ?self.config.fetch_timeout, "Federation fetch timed out");
                Err(FetchError::Timeout {
                    url: url.to_string(),
                    after: self.config.fetch_timeout,
                })
            },
        }
    }
}

fn prepend(head: EntityStatement, tail: Vec<EntityStatement>) -> Vec<EntityStatement> {
    let mut chain = Vec::with_capacity(tail.len() + 1);
    chain.push(head);
    chain.extend(tail);
    chain
}
