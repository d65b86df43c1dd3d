use stash_common::conditions::{
    is_condition_false, is_condition_true, BACKEND_SECRET_FOUND, DEADLINE_EXCEEDED,
    GLOBAL_POST_RESTORE_HOOK_SUCCEEDED, GLOBAL_PRE_RESTORE_HOOK_SUCCEEDED, METRICS_PUSHED,
    POST_RESTORE_HOOK_EXECUTION_SUCCEEDED, PRE_RESTORE_HOOK_EXECUTION_SUCCEEDED,
    REPOSITORY_FOUND, RESTORER_ENSURED, RESTORE_EXECUTOR_ENSURED, RESTORE_TARGET_FOUND,
    VALIDATION_PASSED,
};
use stash_common::crd::{
    HostRestorePhase, HostRestoreStats, RestoreBatchStatus, RestoreMemberStatus, RestorePhase,
    RestoreTargetPhase,
};

fn all_hosts_completed(total_hosts: Option<i32>, stats: &[HostRestoreStats]) -> bool {
    let Some(total) = total_hosts else {
        return false;
    };
    stats.len() as i64 == i64::from(total)
        && stats
            .iter()
            .all(|h| h.phase.map(|p| p.is_completed()).unwrap_or(false))
}

/// Phase of one restore member from its ledger and host reports
pub fn calculate_restore_target_phase(member: &RestoreMemberStatus) -> RestoreTargetPhase {
    let c = &member.conditions;
    if is_condition_false(c, RESTORE_EXECUTOR_ENSURED)
        || is_condition_false(c, RESTORER_ENSURED)
        || is_condition_false(c, PRE_RESTORE_HOOK_EXECUTION_SUCCEEDED)
        || is_condition_false(c, POST_RESTORE_HOOK_EXECUTION_SUCCEEDED)
    {
        return RestoreTargetPhase::Failed;
    }

    let Some(total_hosts) = member.total_hosts else {
        return RestoreTargetPhase::Pending;
    };

    let count = |phase: HostRestorePhase| {
        member
            .stats
            .iter()
            .filter(|h| h.phase == Some(phase))
            .count()
    };
    let failed = count(HostRestorePhase::Failed);
    let unknown = count(HostRestorePhase::Unknown);
    let succeeded = count(HostRestorePhase::Succeeded);

    if ((failed + unknown + succeeded) as i64) < i64::from(total_hosts) {
        return RestoreTargetPhase::Running;
    }
    if failed > 0 {
        RestoreTargetPhase::Failed
    } else if unknown > 0 {
        RestoreTargetPhase::Unknown
    } else {
        RestoreTargetPhase::Succeeded
    }
}

/// Phase of a single-target RestoreSession.
///
/// The session and its only member share one ledger, so `member.conditions`
/// carries session-level conditions such as `MetricsPushed` as well.
pub fn calculate_restore_session_phase(member: &RestoreMemberStatus) -> RestorePhase {
    let c = &member.conditions;
    if is_condition_false(c, RESTORE_EXECUTOR_ENSURED)
        || is_condition_false(c, PRE_RESTORE_HOOK_EXECUTION_SUCCEEDED)
        || is_condition_false(c, POST_RESTORE_HOOK_EXECUTION_SUCCEEDED)
    {
        return RestorePhase::Failed;
    }

    if c.is_empty() || member.phase == RestoreTargetPhase::Pending {
        return RestorePhase::Pending;
    }

    if all_hosts_completed(member.total_hosts, &member.stats) {
        if member.phase == RestoreTargetPhase::Unknown {
            return RestorePhase::Unknown;
        }
        if member.phase == RestoreTargetPhase::Failed || is_condition_false(c, METRICS_PUSHED) {
            return RestorePhase::Failed;
        }
        if is_condition_true(c, METRICS_PUSHED) {
            return RestorePhase::Succeeded;
        }
    }

    if is_condition_false(c, REPOSITORY_FOUND)
        || is_condition_false(c, BACKEND_SECRET_FOUND)
        || is_condition_false(c, RESTORE_TARGET_FOUND)
    {
        return RestorePhase::Pending;
    }

    if is_condition_false(c, VALIDATION_PASSED) {
        return RestorePhase::Invalid;
    }

    RestorePhase::Running
}

/// Phase of a RestoreBatch from its ledger and member phases.
///
/// `total_targets` is the number of members declared in the spec; members
/// that have not reported yet count as incomplete.
pub fn calculate_restore_batch_phase(
    status: &RestoreBatchStatus,
    total_targets: usize,
) -> RestorePhase {
    let c = &status.conditions;

    if is_condition_false(c, METRICS_PUSHED) {
        return RestorePhase::Failed;
    }

    if is_condition_true(c, METRICS_PUSHED)
        && (is_condition_false(c, GLOBAL_PRE_RESTORE_HOOK_SUCCEEDED)
            || is_condition_false(c, GLOBAL_POST_RESTORE_HOOK_SUCCEEDED)
            || is_condition_true(c, DEADLINE_EXCEEDED))
    {
        return RestorePhase::Failed;
    }

    if c.is_empty()
        || status.members.is_empty()
        || status
            .members
            .iter()
            .all(|m| m.phase == RestoreTargetPhase::Pending)
    {
        return RestorePhase::Pending;
    }

    if is_condition_false(c, REPOSITORY_FOUND) || is_condition_false(c, BACKEND_SECRET_FOUND) {
        return RestorePhase::Pending;
    }

    let count = |phase: RestoreTargetPhase| status.members.iter().filter(|m| m.phase == phase).count();
    let failed = count(RestoreTargetPhase::Failed);
    let unknown = count(RestoreTargetPhase::Unknown);
    let succeeded = count(RestoreTargetPhase::Succeeded);

    if failed + unknown + succeeded == total_targets {
        if unknown > 0 {
            return RestorePhase::Unknown;
        }
        if failed > 0 {
            return RestorePhase::Failed;
        }
        if is_condition_true(c, METRICS_PUSHED) {
            return RestorePhase::Succeeded;
        }
    }

    if is_condition_false(c, VALIDATION_PASSED) {
        return RestorePhase::Invalid;
    }

    RestorePhase::Running
}
