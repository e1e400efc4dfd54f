//! Algebraic properties of policy combination and enforcement.

use std::collections::BTreeSet;

use fedtrust_core::policy::{Policy, PolicyList};
use proptest::prelude::*;

const ALPHABET: &[&str] = &["a", "b", "c", "d"];

fn token() -> impl Strategy<Value = String> {
    prop::sample::select(ALPHABET).prop_map(str::to_string)
}

fn token_set() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(token(), 1..=ALPHABET.len())
}

fn single_policy() -> impl Strategy<Value = Policy<String>> {
    (
        prop::option::weighted(0.3, token()),
        prop::option::weighted(0.3, token()),
        prop::option::weighted(0.5, token_set()),
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(value, default_value, one_of, essential)| Policy {
            value,
            default_value,
            one_of,
            essential,
            ..Default::default()
        })
}

proptest! {
    #[test]
    fn single_valued_combine_is_associative(
        top in single_policy(),
        middle in single_policy(),
        bottom in single_policy(),
    ) {
        let left = top
            .clone()
            .combine(middle.clone())
            .and_then(|p| p.combine(bottom.clone()));
        let right = middle
            .combine(bottom)
            .and_then(|p| top.combine(p));

        if let (Ok(left), Ok(right)) = (left, right) {
            prop_assert_eq!(left, right);
        }
    }

    #[test]
    fn value_overrides_any_declared_input(
        fixed in token(),
        declared in prop::option::of(token()),
        essential in any::<bool>(),
    ) {
        let policy = Policy::new().with_value(fixed.clone()).with_essential(essential);
        prop_assert_eq!(policy.enforce(declared, "claim").unwrap(), Some(fixed));
    }

    #[test]
    fn essential_alone_rejects_missing_value(name in "[a-z_]{1,12}") {
        let policy: Policy<String> = Policy::new().with_essential(true);
        let err = policy.enforce(None, &name).unwrap_err();
        prop_assert!(!err.is_conflict());
    }

    #[test]
    fn subset_of_result_stays_within_ceiling(
        ceiling in token_set(),
        declared in prop::collection::vec(token(), 0..6),
    ) {
        let policy = PolicyList::new().with_subset_of(ceiling.clone());
        let effective = policy.enforce(Some(declared), "claim").unwrap().unwrap_or_default();
        prop_assert!(effective.iter().all(|v| ceiling.contains(v)));
    }

    #[test]
    fn superset_of_combination_is_union(a in token_set(), b in token_set()) {
        let superior = PolicyList::new().with_superset_of(a.clone());
        let inferior = PolicyList::new().with_superset_of(b.clone());
        let combined = superior.combine(inferior).unwrap();
        let union: BTreeSet<String> = a.union(&b).cloned().collect();
        prop_assert_eq!(combined.superset_of, Some(union));
    }
}

#[test]
fn subset_of_filters_declared_values() {
    let policy = PolicyList::new().with_subset_of(["a".to_string(), "b".to_string()]);
    let effective = policy
        .enforce(Some(vec!["a".to_string(), "c".to_string()]), "grant_types")
        .unwrap();
    assert_eq!(effective, Some(vec!["a".to_string()]));
}

#[test]
fn superset_of_union_example() {
    let combined = PolicyList::new()
        .with_superset_of(["a".to_string()])
        .combine(PolicyList::new().with_superset_of(["b".to_string()]))
        .unwrap();
    let expected: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
    assert_eq!(combined.superset_of, Some(expected));
}
