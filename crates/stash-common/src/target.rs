//! Target matching
//!
//! Targets declared on an invoker and target statuses reported on a session
//! are updated independently; [`TargetRef`] equality is the join key between
//! them. Matching is exact and field-wise, with no alias normalization.

use crate::crd::TargetRef;

/// Exact field-wise equality of two target references
pub fn target_matched(a: &TargetRef, b: &TargetRef) -> bool {
    a.api_version == b.api_version
        && a.kind == b.kind
        && a.namespace == b.namespace
        && a.name == b.name
}

/// Anything keyed by a target reference (target statuses, member ledgers)
pub trait HasTargetRef {
    /// The reference identifying this entry
    fn target_ref(&self) -> &TargetRef;
}

/// Find the entry for `target` in a list keyed by target reference
pub fn find_by_target<'a, T: HasTargetRef>(entries: &'a [T], target: &TargetRef) -> Option<&'a T> {
    entries
        .iter()
        .find(|e| target_matched(e.target_ref(), target))
}

/// Mutable variant of [`find_by_target`]
pub fn find_by_target_mut<'a, T: HasTargetRef>(
    entries: &'a mut [T],
    target: &TargetRef,
) -> Option<&'a mut T> {
    entries
        .iter_mut()
        .find(|e| target_matched(e.target_ref(), target))
}

/// Default an empty namespace to the invoker's namespace
pub fn with_default_namespace(mut target: TargetRef, namespace: &str) -> TargetRef {
    if target.namespace.is_empty() {
        target.namespace = namespace.to_string();
    }
    target
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs() -> Vec<TargetRef> {
        vec![
            TargetRef::new("apps/v1", "Deployment", "web", "demo"),
            TargetRef::new("apps/v1", "Deployment", "web", "demo"),
            TargetRef::new("apps/v1", "StatefulSet", "web", "demo"),
            TargetRef::new("apps/v1", "Deployment", "web", "prod"),
            TargetRef::new("apps/v1beta1", "Deployment", "web", "demo"),
            TargetRef::empty(),
        ]
    }

    /// Story: matching behaves as an equivalence relation over references
    #[test]
    fn story_target_matched_is_an_equivalence_relation() {
        let all = refs();
        for a in &all {
            assert!(target_matched(a, a), "reflexive for {a}");
            for b in &all {
                assert_eq!(target_matched(a, b), target_matched(b, a), "symmetric");
                for c in &all {
                    if target_matched(a, b) && target_matched(b, c) {
                        assert!(target_matched(a, c), "transitive");
                    }
                }
            }
        }
    }

    #[test]
    fn test_every_field_participates() {
        let all = refs();
        assert!(target_matched(&all[0], &all[1]));
        assert!(!target_matched(&all[0], &all[2]));
        assert!(!target_matched(&all[0], &all[3]));
        assert!(!target_matched(&all[0], &all[4]));
        assert!(!target_matched(&all[0], &all[5]));
    }

    #[test]
    fn test_default_namespace() {
        let r = with_default_namespace(TargetRef::new("apps/v1", "Deployment", "web", ""), "demo");
        assert_eq!(r.namespace, "demo");
        let r = with_default_namespace(
            TargetRef::new("apps/v1", "Deployment", "web", "prod"),
            "demo",
        );
        assert_eq!(r.namespace, "prod");
    }
}
