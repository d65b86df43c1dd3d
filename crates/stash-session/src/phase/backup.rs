use stash_common::conditions::{
    is_condition_false, is_condition_true, BACKUP_DISRUPTED, BACKUP_EXECUTOR_ENSURED,
    BACKUP_HISTORY_CLEANED, BACKUP_SKIPPED, DEADLINE_EXCEEDED, GLOBAL_POST_BACKUP_HOOK_SUCCEEDED,
    GLOBAL_PRE_BACKUP_HOOK_SUCCEEDED, METRICS_PUSHED, POST_BACKUP_HOOK_EXECUTION_SUCCEEDED,
    PRE_BACKUP_HOOK_EXECUTION_SUCCEEDED, REPOSITORY_INTEGRITY_VERIFIED, REPOSITORY_METRICS_PUSHED,
    RETENTION_POLICY_APPLIED,
};
use stash_common::crd::{
    BackupSessionPhase, BackupSessionStatus, BackupTargetPhase, BackupTargetStatus,
    HostBackupPhase,
};

/// Phase of one backup target from its ledger and host reports
pub fn calculate_backup_target_phase(target: &BackupTargetStatus) -> BackupTargetPhase {
    let c = &target.conditions;
    if is_condition_false(c, BACKUP_EXECUTOR_ENSURED)
        || is_condition_false(c, PRE_BACKUP_HOOK_EXECUTION_SUCCEEDED)
        || is_condition_true(c, BACKUP_DISRUPTED)
        || is_condition_false(c, POST_BACKUP_HOOK_EXECUTION_SUCCEEDED)
    {
        return BackupTargetPhase::Failed;
    }

    let Some(total_hosts) = target.total_hosts else {
        return BackupTargetPhase::Pending;
    };

    let failed = target
        .stats
        .iter()
        .filter(|h| h.phase == Some(HostBackupPhase::Failed))
        .count();
    let succeeded = target
        .stats
        .iter()
        .filter(|h| h.phase == Some(HostBackupPhase::Succeeded))
        .count();

    if ((failed + succeeded) as i64) < i64::from(total_hosts) {
        return BackupTargetPhase::Running;
    }
    if failed > 0 {
        BackupTargetPhase::Failed
    } else {
        BackupTargetPhase::Succeeded
    }
}

/// Phase of a backup session from its ledger and target phases.
///
/// Target phases are read as stored; callers recompute them first.
pub fn calculate_backup_session_phase(status: &BackupSessionStatus) -> BackupSessionPhase {
    let c = &status.conditions;

    if is_condition_false(c, METRICS_PUSHED) {
        return BackupSessionPhase::Failed;
    }

    if is_condition_true(c, BACKUP_SKIPPED) {
        return BackupSessionPhase::Skipped;
    }

    if is_condition_true(c, METRICS_PUSHED)
        && (is_condition_true(c, DEADLINE_EXCEEDED)
            || is_condition_false(c, BACKUP_HISTORY_CLEANED)
            || is_condition_false(c, GLOBAL_PRE_BACKUP_HOOK_SUCCEEDED)
            || is_condition_false(c, GLOBAL_POST_BACKUP_HOOK_SUCCEEDED))
    {
        return BackupSessionPhase::Failed;
    }

    if status
        .targets
        .iter()
        .all(|t| t.phase == BackupTargetPhase::Pending)
    {
        return BackupSessionPhase::Pending;
    }

    let all_completed = status.targets.iter().all(|t| t.phase.is_completed());
    if all_completed && is_condition_true(c, METRICS_PUSHED) {
        let any_failed = status
            .targets
            .iter()
            .any(|t| t.phase == BackupTargetPhase::Failed);
        if any_failed
            || is_condition_false(c, RETENTION_POLICY_APPLIED)
            || is_condition_false(c, REPOSITORY_METRICS_PUSHED)
            || is_condition_false(c, REPOSITORY_INTEGRITY_VERIFIED)
        {
            return BackupSessionPhase::Failed;
        }
        return BackupSessionPhase::Succeeded;
    }

    BackupSessionPhase::Running
}
