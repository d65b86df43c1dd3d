//! Target Coordinator
//!
//! Gates target execution for invokers with `executionOrder: Sequential`.
//! There is no lock: each executor re-checks eligibility against the latest
//! session status before it starts work, so the barrier tolerates eventual
//! consistency.

use stash_common::crd::{
    BackupTargetPhase, BackupTargetStatus, ExecutionOrder, RestoreMemberStatus,
    RestoreTargetPhase, TargetRef,
};
use stash_common::target::{find_by_target, target_matched, HasTargetRef};

/// An observed target status that can report completion
pub trait TargetProgress: HasTargetRef {
    /// True once the target has reached a final outcome
    fn is_completed(&self) -> bool;
}

impl TargetProgress for BackupTargetStatus {
    fn is_completed(&self) -> bool {
        matches!(
            self.phase,
            BackupTargetPhase::Succeeded | BackupTargetPhase::Failed
        )
    }
}

impl TargetProgress for RestoreMemberStatus {
    fn is_completed(&self) -> bool {
        matches!(
            self.phase,
            RestoreTargetPhase::Succeeded | RestoreTargetPhase::Failed | RestoreTargetPhase::Unknown
        )
    }
}

/// Whether `candidate` may start under sequential order.
///
/// Walks `declared` in order: reaching the candidate means every predecessor
/// completed; an earlier target that is absent from `observed` or still
/// running blocks it. A candidate that is not declared (the empty
/// cluster-wide target) is always eligible.
pub fn next_in_order<T: TargetProgress>(
    declared: &[TargetRef],
    candidate: &TargetRef,
    observed: &[T],
) -> bool {
    for target in declared {
        if target_matched(target, candidate) {
            return true;
        }
        let completed = find_by_target(observed, target)
            .map(|status| status.is_completed())
            .unwrap_or(false);
        if !completed {
            return false;
        }
    }
    true
}

/// Whether `candidate` may start under the given execution order
pub fn is_eligible<T: TargetProgress>(
    order: ExecutionOrder,
    declared: &[TargetRef],
    candidate: &TargetRef,
    observed: &[T],
) -> bool {
    match order {
        ExecutionOrder::Parallel => true,
        ExecutionOrder::Sequential => next_in_order(declared, candidate, observed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs() -> Vec<TargetRef> {
        ["a", "b", "c"]
            .iter()
            .map(|n| TargetRef::new("apps/v1", "Deployment", *n, "demo"))
            .collect()
    }

    fn backup(target: &TargetRef, phase: BackupTargetPhase) -> BackupTargetStatus {
        BackupTargetStatus {
            ref_: target.clone(),
            phase,
            ..Default::default()
        }
    }

    fn restore(target: &TargetRef, phase: RestoreTargetPhase) -> RestoreMemberStatus {
        RestoreMemberStatus {
            ref_: target.clone(),
            phase,
            ..Default::default()
        }
    }

    /// Story: C only becomes eligible once both A and B finished, whatever their outcome
    #[test]
    fn story_sequential_targets_wait_for_predecessors() {
        let targets = refs();
        let (a, b, c) = (&targets[0], &targets[1], &targets[2]);
        let mut observed: Vec<BackupTargetStatus> = Vec::new();

        assert!(next_in_order(&targets, a, &observed));
        assert!(!next_in_order(&targets, b, &observed));
        assert!(!next_in_order(&targets, c, &observed));

        observed.push(backup(a, BackupTargetPhase::Running));
        assert!(!next_in_order(&targets, b, &observed));

        observed[0].phase = BackupTargetPhase::Failed;
        assert!(next_in_order(&targets, b, &observed));
        assert!(!next_in_order(&targets, c, &observed));

        observed.push(backup(b, BackupTargetPhase::Pending));
        assert!(!next_in_order(&targets, c, &observed));

        observed[1].phase = BackupTargetPhase::Succeeded;
        assert!(next_in_order(&targets, c, &observed));
    }

    #[test]
    fn test_parallel_bypasses_ordering() {
        let targets = refs();
        let observed: Vec<BackupTargetStatus> = Vec::new();
        for t in &targets {
            assert!(is_eligible(ExecutionOrder::Parallel, &targets, t, &observed));
        }
        assert!(!is_eligible(
            ExecutionOrder::Sequential,
            &targets,
            &targets[2],
            &observed
        ));
    }

    #[test]
    fn test_undeclared_target_never_blocks() {
        let targets = refs();
        let observed: Vec<BackupTargetStatus> = Vec::new();
        assert!(next_in_order(&targets, &TargetRef::empty(), &observed));
        assert!(next_in_order::<BackupTargetStatus>(&[], &targets[0], &[]));
    }

    #[test]
    fn test_restore_unknown_counts_as_completed() {
        let targets = refs();
        let observed = vec![
            restore(&targets[0], RestoreTargetPhase::Unknown),
            restore(&targets[1], RestoreTargetPhase::Running),
        ];
        assert!(next_in_order(&targets, &targets[1], &observed));
        assert!(!next_in_order(&targets, &targets[2], &observed));
    }

    #[test]
    fn test_matching_is_namespace_aware() {
        let targets = refs();
        let foreign = TargetRef::new("apps/v1", "Deployment", "a", "other");
        let observed = vec![backup(&foreign, BackupTargetPhase::Succeeded)];
        assert!(!next_in_order(&targets, &targets[1], &observed));
    }
}
