//! Metadata policy operators.
//!
//! A superior entity constrains the metadata of its subordinates claim by
//! claim. Single-valued claims carry a [`Policy`], multi-valued claims a
//! [`PolicyList`]. Policies along a chain are folded with `combine`
//! (superior first) and the result is applied to the leaf's declared value
//! with `enforce`.
//!
//! Per-entity-type policy structs are generated from claim tables by the
//! `metadata_claims!` macro, so each claim's combination and enforcement rule
//! is dispatched statically.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure while combining or enforcing policies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Two policies on one claim cannot be reconciled.
    #[error("conflicting policy for `{}`: {reason}", .claim.as_deref().unwrap_or("<claim>"))]
    Conflict {
        /// Claim name, filled in by the metadata-level combine.
        claim: Option<String>,
        /// What conflicted.
        reason: String,
    },

    /// A declared value does not satisfy the policy.
    #[error("policy violation for `{claim}`: {reason}")]
    Violation {
        /// Claim name.
        claim: String,
        /// What was violated.
        reason: String,
    },
}

impl PolicyError {
    /// Conflict on a named claim.
    pub fn conflict(claim: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            claim: Some(claim.into()),
            reason: reason.into(),
        }
    }

    /// Violation on a named claim.
    pub fn violation(claim: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Violation {
            claim: claim.into(),
            reason: reason.into(),
        }
    }

    fn unnamed_conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            claim: None,
            reason: reason.into(),
        }
    }

    /// Attach a claim name to a conflict raised below the metadata level.
    #[must_use]
    pub fn with_claim(self, name: &str) -> Self {
        match self {
            Self::Conflict { claim: None, reason } => Self::Conflict {
                claim: Some(name.to_string()),
                reason,
            },
            other => other,
        }
    }

    /// Whether this is a combine-time conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

// =============================================================================
// Single-valued policy
// =============================================================================

/// Policy on a single-valued claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Ord"))]
pub struct Policy<T: Ord> {
    /// Fixed value, overrides whatever the subject declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,

    /// Value used when the subject declares none.
    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<T>,

    /// Acceptable values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<BTreeSet<T>>,

    /// The subject must declare a value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,

    /// Operators this engine does not interpret, passed through unchanged.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl<T: Ord> Default for Policy<T> {
    fn default() -> Self {
        Self {
            value: None,
            default_value: None,
            one_of: None,
            essential: None,
            other: BTreeMap::new(),
        }
    }
}

impl<T: Clone + Ord + Debug> Policy<T> {
    /// Empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `value`.
    #[must_use]
    pub fn with_value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    /// Set `default`.
    #[must_use]
    pub fn with_default(mut self, value: T) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Set `one_of`.
    #[must_use]
    pub fn with_one_of(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.one_of = Some(values.into_iter().collect());
        self
    }

    /// Set `essential`.
    #[must_use]
    pub fn with_essential(mut self, essential: bool) -> Self {
        self.essential = Some(essential);
        self
    }

    /// Whether the claim is required.
    pub fn is_essential(&self) -> bool {
        self.essential.unwrap_or(false)
    }

    /// Combine with a policy from a subordinate (`self` is the superior).
    pub fn combine(self, inferior: Self) -> Result<Self, PolicyError> {
        let value = merge_exclusive(self.value, inferior.value, "value")?;
        let default_value = merge_exclusive(self.default_value, inferior.default_value, "default")?;

        let one_of = match (self.one_of, inferior.one_of) {
            (Some(superior), Some(inferior)) => {
                let common: BTreeSet<T> = superior.intersection(&inferior).cloned().collect();
                if common.is_empty() {
                    return Err(PolicyError::unnamed_conflict(format!(
                        "one_of {superior:?} and {inferior:?} have no value in common"
                    )));
                }
                Some(common)
            },
            (superior, inferior) => superior.or(inferior),
        };

        let mut other = inferior.other;
        other.extend(self.other);

        Self {
            value,
            default_value,
            one_of,
            essential: combine_essential(self.essential, inferior.essential),
            other,
        }
        .normalized()
    }

    fn normalized(mut self) -> Result<Self, PolicyError> {
        if self.value.is_some() && self.default_value.is_some() {
            return Err(PolicyError::unnamed_conflict(
                "value and default cannot both be set",
            ));
        }

        if let Some(value) = &self.value {
            if let Some(one_of) = &self.one_of {
                if !one_of.contains(value) {
                    return Err(PolicyError::unnamed_conflict(format!(
                        "value {value:?} is not one of {one_of:?}"
                    )));
                }
            }
            // value is absolute
            self.one_of = None;
        }

        if let (Some(default_value), Some(one_of)) = (&self.default_value, &self.one_of) {
            if !one_of.contains(default_value) {
                return Err(PolicyError::unnamed_conflict(format!(
                    "default {default_value:?} is not one of {one_of:?}"
                )));
            }
        }

        Ok(self)
    }

    /// Apply to a declared value, returning the effective one.
    pub fn enforce(&self, declared: Option<T>, claim: &str) -> Result<Option<T>, PolicyError> {
        if let Some(value) = &self.value {
            return Ok(Some(value.clone()));
        }

        if declared.is_none() {
            if let Some(default_value) = &self.default_value {
                return Ok(Some(default_value.clone()));
            }
        }

        if let Some(one_of) = &self.one_of {
            match &declared {
                Some(v) if one_of.contains(v) => {},
                Some(v) => {
                    return Err(PolicyError::violation(
                        claim,
                        format!("{v:?} is not one of {one_of:?}"),
                    ))
                },
                None => {
                    return Err(PolicyError::violation(
                        claim,
                        format!("no value declared, expected one of {one_of:?}"),
                    ))
                },
            }
        }

        if declared.is_none() && self.is_essential() {
            return Err(PolicyError::violation(claim, "claim must exist"));
        }

        Ok(declared)
    }
}

// =============================================================================
// Multi-valued policy
// =============================================================================

/// Policy on a multi-valued claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Ord"))]
pub struct PolicyList<T: Ord> {
    /// Fixed set, overrides the declared set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<BTreeSet<T>>,

    /// Set used when the subject declares none.
    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<BTreeSet<T>>,

    /// Values unioned into the declared set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add: Option<BTreeSet<T>>,

    /// Ceiling: declared values outside it are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset_of: Option<BTreeSet<T>>,

    /// Floor: the declared set must contain all of it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superset_of: Option<BTreeSet<T>>,

    /// The subject must declare a non-empty set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,

    /// Operators this engine does not interpret, passed through unchanged.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl<T: Ord> Default for PolicyList<T> {
    fn default() -> Self {
        Self {
            value: None,
            default_value: None,
            add: None,
            subset_of: None,
            superset_of: None,
            essential: None,
            other: BTreeMap::new(),
        }
    }
}

impl<T: Clone + Ord + Debug> PolicyList<T> {
    /// Empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `value`.
    #[must_use]
    pub fn with_value(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.value = Some(values.into_iter().collect());
        self
    }

    /// Set `default`.
    #[must_use]
    pub fn with_default(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.default_value = Some(values.into_iter().collect());
        self
    }

    /// Set `add`.
    #[must_use]
    pub fn with_add(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.add = Some(values.into_iter().collect());
        self
    }

    /// Set `subset_of`.
    #[must_use]
    pub fn with_subset_of(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.subset_of = Some(values.into_iter().collect());
        self
    }

    /// Set `superset_of`.
    #[must_use]
    pub fn with_superset_of(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.superset_of = Some(values.into_iter().collect());
        self
    }

    /// Set `essential`.
    #[must_use]
    pub fn with_essential(mut self, essential: bool) -> Self {
        self.essential = Some(essential);
        self
    }

    /// Whether a non-empty declared set is required.
    pub fn is_essential(&self) -> bool {
        self.essential.unwrap_or(false)
    }

    /// Combine with a policy from a subordinate (`self` is the superior).
    pub fn combine(self, inferior: Self) -> Result<Self, PolicyError> {
        let value = merge_exclusive(self.value, inferior.value, "value")?;
        let default_value = merge_exclusive(self.default_value, inferior.default_value, "default")?;

        let subset_of = match (self.subset_of, inferior.subset_of) {
            (Some(superior), Some(inferior)) => {
                let common: BTreeSet<T> = superior.intersection(&inferior).cloned().collect();
                // An empty ceiling constrains nothing further.
                (!common.is_empty()).then_some(common)
            },
            (superior, inferior) => superior.or(inferior),
        };

        let mut other = inferior.other;
        other.extend(self.other);

        Self {
            value,
            default_value,
            add: union(self.add, inferior.add),
            subset_of,
            superset_of: union(self.superset_of, inferior.superset_of),
            essential: combine_essential(self.essential, inferior.essential),
            other,
        }
        .normalized()
    }

    fn normalized(mut self) -> Result<Self, PolicyError> {
        if self.value.is_some() && self.default_value.is_some() {
            return Err(PolicyError::unnamed_conflict(
                "value and default cannot both be set",
            ));
        }

        if let (Some(add), Some(subset_of)) = (&self.add, &self.subset_of) {
            if !add.is_subset(subset_of) {
                return Err(PolicyError::unnamed_conflict(format!(
                    "add {add:?} is not within subset_of {subset_of:?}"
                )));
            }
        }

        if let (Some(superset_of), Some(subset_of)) = (&self.superset_of, &self.subset_of) {
            if !superset_of.is_subset(subset_of) {
                return Err(PolicyError::unnamed_conflict(format!(
                    "superset_of {superset_of:?} is not within subset_of {subset_of:?}"
                )));
            }
        }

        // A default only applies when nothing is declared; it is not held
        // to the set operators.
        if let Some(value) = &self.value {
            self.check_containment("value", value)?;
        }

        if let (Some(value), Some(add)) = (&self.value, &self.add) {
            if !add.is_subset(value) {
                return Err(PolicyError::unnamed_conflict(format!(
                    "value {value:?} does not contain add {add:?}"
                )));
            }
        }

        if self.value.is_some() {
            // value is absolute
            self.subset_of = None;
            self.superset_of = None;
        }

        Ok(self)
    }

    fn check_containment(&self, operator: &str, set: &BTreeSet<T>) -> Result<(), PolicyError> {
        if let Some(subset_of) = &self.subset_of {
            if !set.is_subset(subset_of) {
                return Err(PolicyError::unnamed_conflict(format!(
                    "{operator} {set:?} is not within subset_of {subset_of:?}"
                )));
            }
        }
        if let Some(superset_of) = &self.superset_of {
            if !set.is_superset(superset_of) {
                return Err(PolicyError::unnamed_conflict(format!(
                    "{operator} {set:?} does not contain superset_of {superset_of:?}"
                )));
            }
        }
        Ok(())
    }

    /// Apply to a declared list, returning the effective one.
    ///
    /// Declared order is preserved; `add` appends missing values and
    /// `subset_of` filters in place.
    pub fn enforce(
        &self,
        declared: Option<Vec<T>>,
        claim: &str,
    ) -> Result<Option<Vec<T>>, PolicyError> {
        let absent = declared.as_ref().map_or(true, Vec::is_empty);
        if absent && self.is_essential() {
            return Err(PolicyError::violation(claim, "claim must exist"));
        }

        let mut declared = declared;

        if let Some(add) = &self.add {
            let mut values = declared.unwrap_or_default();
            for item in add {
                if !values.contains(item) {
                    values.push(item.clone());
                }
            }
            declared = Some(values);
        }

        if let Some(value) = &self.value {
            return Ok(Some(value.iter().cloned().collect()));
        }

        if declared.is_none() {
            if let Some(default_value) = &self.default_value {
                return Ok(Some(default_value.iter().cloned().collect()));
            }
        }

        if let Some(superset_of) = &self.superset_of {
            let missing: Vec<&T> = match &declared {
                Some(values) => superset_of.iter().filter(|s| !values.contains(s)).collect(),
                None => superset_of.iter().collect(),
            };
            if !missing.is_empty() {
                return Err(PolicyError::violation(
                    claim,
                    format!("missing required values {missing:?}"),
                ));
            }
        }

        if let (Some(subset_of), Some(values)) = (&self.subset_of, declared.as_mut()) {
            values.retain(|v| subset_of.contains(v));
        }

        Ok(declared)
    }
}

fn merge_exclusive<V: PartialEq + Debug>(
    superior: Option<V>,
    inferior: Option<V>,
    operator: &str,
) -> Result<Option<V>, PolicyError> {
    match (superior, inferior) {
        (Some(s), Some(i)) if s != i => Err(PolicyError::unnamed_conflict(format!(
            "{operator} {s:?} differs from subordinate {operator} {i:?}"
        ))),
        (s, i) => Ok(s.or(i)),
    }
}

fn union<T: Ord>(a: Option<BTreeSet<T>>, b: Option<BTreeSet<T>>) -> Option<BTreeSet<T>> {
    match (a, b) {
        (Some(mut a), Some(b)) => {
            a.extend(b);
            Some(a)
        },
        (a, b) => a.or(b),
    }
}

fn combine_essential(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a || b),
        (a, b) => a.or(b),
    }
}

// =============================================================================
// Claim dispatch
// =============================================================================

/// Uniform view over [`Policy`] and [`PolicyList`] used by claim tables.
pub trait ClaimPolicy: Sized {
    /// Shape of the declared metadata value.
    type Declared;

    /// Combine with the subordinate's policy for the same claim.
    fn combine_claim(self, inferior: Self) -> Result<Self, PolicyError>;

    /// Enforce on the declared value of `claim`.
    fn enforce_claim(
        &self,
        declared: Option<Self::Declared>,
        claim: &str,
    ) -> Result<Option<Self::Declared>, PolicyError>;
}

impl<T: Clone + Ord + Debug> ClaimPolicy for Policy<T> {
    type Declared = T;

    fn combine_claim(self, inferior: Self) -> Result<Self, PolicyError> {
        self.combine(inferior)
    }

    fn enforce_claim(&self, declared: Option<T>, claim: &str) -> Result<Option<T>, PolicyError> {
        self.enforce(declared, claim)
    }
}

impl<T: Clone + Ord + Debug> ClaimPolicy for PolicyList<T> {
    type Declared = Vec<T>;

    fn combine_claim(self, inferior: Self) -> Result<Self, PolicyError> {
        self.combine(inferior)
    }

    fn enforce_claim(
        &self,
        declared: Option<Vec<T>>,
        claim: &str,
    ) -> Result<Option<Vec<T>>, PolicyError> {
        self.enforce(declared, claim)
    }
}

/// Combine two optional claim policies; an absent side yields the other.
pub fn combine_optional<P: ClaimPolicy>(
    superior: Option<P>,
    inferior: Option<P>,
    claim: &str,
) -> Result<Option<P>, PolicyError> {
    match (superior, inferior) {
        (Some(s), Some(i)) => s
            .combine_claim(i)
            .map(Some)
            .map_err(|e| e.with_claim(claim)),
        (s, i) => Ok(s.or(i)),
    }
}

/// Enforce an optional claim policy; no policy leaves the value untouched.
pub fn enforce_optional<P: ClaimPolicy>(
    policy: Option<&P>,
    declared: Option<P::Declared>,
    claim: &str,
) -> Result<Option<P::Declared>, PolicyError> {
    match policy {
        Some(policy) => policy.enforce_claim(declared, claim),
        None => Ok(declared),
    }
}

/// Generates a metadata struct and its policy struct from one claim table.
///
/// Each row is `field: single|list Type => "claim_name",`. An optional
/// `common` row flattens a nested table, and `extra` rows add metadata-only
/// fields that policies never touch.
macro_rules! metadata_claims {
    (@declared single $ty:ty) => { $ty };
    (@declared list $ty:ty) => { Vec<$ty> };
    (@policy single $ty:ty) => { $crate::policy::Policy<$ty> };
    (@policy list $ty:ty) => { $crate::policy::PolicyList<$ty> };

    (
        $(#[$metadata_attr:meta])*
        metadata $metadata:ident;
        $(#[$policy_attr:meta])*
        policy $policy:ident;
        claims {
            $( $field:ident : $kind:ident $ty:ty => $claim:literal, )*
        }
        $( common $common:ident : $common_metadata:ty, $common_policy:ty; )?
        $( extra {
            $( $(#[$extra_attr:meta])* $extra:ident : $extra_ty:ty => $extra_claim:literal, )*
        } )?
    ) => {
        $(#[$metadata_attr])*
        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $metadata {
            $(
                #[doc = concat!("`", $claim, "`")]
                #[serde(rename = $claim, default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$crate::policy::metadata_claims!(@declared $kind $ty)>,
            )*
            $($(
                $(#[$extra_attr])*
                #[serde(rename = $extra_claim, default, skip_serializing_if = "Option::is_none")]
                pub $extra: Option<$extra_ty>,
            )*)?
            $(
                /// Claims shared by every entity type.
                #[serde(flatten)]
                pub $common: $common_metadata,
            )?
        }

        $(#[$policy_attr])*
        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $policy {
            $(
                #[doc = concat!("Policy on `", $claim, "`")]
                #[serde(rename = $claim, default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$crate::policy::metadata_claims!(@policy $kind $ty)>,
            )*
            $(
                /// Policy on the shared claims.
                #[serde(flatten)]
                pub $common: $common_policy,
            )?
        }

        impl $policy {
            /// Claim names this policy can constrain, in table order.
            pub const CLAIMS: &'static [&'static str] = &[$($claim),*];

            /// Combine with a subordinate's policy (`self` is the superior).
            pub fn combine(self, inferior: Self) -> Result<Self, $crate::policy::PolicyError> {
                Ok(Self {
                    $(
                        $field: $crate::policy::combine_optional(
                            self.$field,
                            inferior.$field,
                            $claim,
                        )?,
                    )*
                    $(
                        $common: self.$common.combine(inferior.$common)?,
                    )?
                })
            }

            /// Apply to declared metadata, returning the effective metadata.
            pub fn enforce(&self, metadata: $metadata) -> Result<$metadata, $crate::policy::PolicyError> {
                let mut metadata = metadata;
                $(
                    metadata.$field = $crate::policy::enforce_optional(
                        self.$field.as_ref(),
                        metadata.$field.take(),
                        $claim,
                    )?;
                )*
                $(
                    metadata.$common = self.$common.enforce(metadata.$common)?;
                )?
                Ok(metadata)
            }

            /// Whether no claim is constrained.
            pub fn is_empty(&self) -> bool {
                true $( && self.$field.is_none() )* $( && self.$common.is_empty() )?
            }
        }
    };
}

pub(crate) use metadata_claims;
