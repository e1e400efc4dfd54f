//! Policy folding over a chain and selection of the acceptable chain.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::FederationError;
use crate::metadata::{Metadata, MetadataPolicy};
use crate::policy::PolicyError;
use crate::resolver::TrustChain;
use crate::statement::EntityStatement;

/// Fold the metadata policies of a leaf-to-anchor chain.
///
/// Starts from the element nearest the anchor and combines inward, stopping
/// before the leaf's own statement. `None` when no element carries a policy.
pub fn fold_chain_policy(
    chain: &[EntityStatement],
) -> Result<Option<MetadataPolicy>, PolicyError> {
    let Some((last, inner)) = chain.split_last() else {
        return Ok(None);
    };
    if inner.is_empty() {
        return Ok(None);
    }

    let mut combined = last.metadata_policy.clone();
    for statement in inner[1..].iter().rev() {
        combined = match (combined, statement.metadata_policy.clone()) {
            (Some(superior), Some(inferior)) => Some(superior.combine(inferior).map_err(|e| {
                debug!(issuer = %statement.issuer_str(), error = %e, "Policy fold conflict");
                e
            })?),
            (superior, inferior) => superior.or(inferior),
        };
    }
    Ok(combined)
}

/// Apply a combined policy to declared metadata.
pub fn enforce_policy(
    combined_policy: &MetadataPolicy,
    declared: Metadata,
) -> Result<Metadata, PolicyError> {
    combined_policy.enforce(declared)
}

/// A chain whose policy the leaf's metadata satisfies, with the effective
/// metadata.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedChain {
    /// Selected chain.
    pub chain: TrustChain,
    /// Declared metadata after policy enforcement.
    pub metadata: Metadata,
}

/// First chain, in order, whose combined policy accepts `declared`.
///
/// A chain without a combined policy accepts the metadata unchanged.
pub fn select_acceptable_chain(
    chains: Vec<TrustChain>,
    declared: &Metadata,
) -> Option<AcceptedChain> {
    chains
        .into_iter()
        .find_map(|chain| match try_chain(&chain, declared) {
            Ok(metadata) => Some(AcceptedChain { chain, metadata }),
            Err(e) => {
                warn!(
                    trust_anchor = %chain.trust_anchor_id,
                    error = %e,
                    "Chain rejected: metadata violates policy"
                );
                None
            },
        })
}

/// [`select_acceptable_chain`] with the failure classified.
///
/// When exactly one candidate existed and it rejected the metadata, its
/// violation is returned; every other failure is
/// [`FederationError::NoAcceptableChain`].
pub fn require_acceptable_chain(
    chains: Vec<TrustChain>,
    declared: &Metadata,
    leaf_id: &str,
) -> Result<AcceptedChain, FederationError> {
    let no_chain = || FederationError::NoAcceptableChain {
        entity_id: leaf_id.to_string(),
    };

    match chains.as_slice() {
        [] => Err(no_chain()),
        [only] => {
            let metadata = try_chain(only, declared).map_err(FederationError::from)?;
            info!(trust_anchor = %only.trust_anchor_id, "Trust chain accepted");
            Ok(AcceptedChain {
                chain: only.clone(),
                metadata,
            })
        },
        _ => {
            let accepted = select_acceptable_chain(chains, declared).ok_or_else(no_chain)?;
            info!(trust_anchor = %accepted.chain.trust_anchor_id, "Trust chain accepted");
            Ok(accepted)
        },
    }
}

fn try_chain(chain: &TrustChain, declared: &Metadata) -> Result<Metadata, PolicyError> {
    match &chain.combined_policy {
        Some(policy) => enforce_policy(policy, declared.clone()),
        None => Ok(declared.clone()),
    }
}
