use stash_common::conditions::{
    is_condition_false, is_condition_true, is_condition_unknown, BACKEND_SECRET_FOUND, CRON_JOB_CREATED,
    REPOSITORY_FOUND, VALIDATION_PASSED,
};
use stash_common::crd::{BackupInvokerPhase, Condition, Snapshotter};

/// Readiness of a backup invoker from its own ledger.
///
/// A repository or backend secret reported `False` or `Unknown` keeps the
/// invoker NotReady. Only the Restic driver requires both to be `True`
/// before it can become Ready.
pub fn calculate_backup_invoker_phase(
    conditions: &[Condition],
    driver: Snapshotter,
) -> BackupInvokerPhase {
    let unsatisfied = |t: &str| is_condition_false(conditions, t) || is_condition_unknown(conditions, t);
    if unsatisfied(REPOSITORY_FOUND) || unsatisfied(BACKEND_SECRET_FOUND) {
        return BackupInvokerPhase::NotReady;
    }

    if is_condition_false(conditions, VALIDATION_PASSED) {
        return BackupInvokerPhase::Invalid;
    }

    let backend_ready = driver != Snapshotter::Restic
        || (is_condition_true(conditions, REPOSITORY_FOUND)
            && is_condition_true(conditions, BACKEND_SECRET_FOUND));

    if is_condition_true(conditions, VALIDATION_PASSED)
        && is_condition_true(conditions, CRON_JOB_CREATED)
        && backend_ready
    {
        return BackupInvokerPhase::Ready;
    }

    BackupInvokerPhase::NotReady
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_common::crd::ConditionStatus;

    fn t(type_: &str) -> Condition {
        Condition::truthy(type_, "Test")
    }

    fn f(type_: &str) -> Condition {
        Condition::falsy(type_, "Test", "failed")
    }

    #[test]
    fn test_restic_requires_backend() {
        let conditions = vec![t(VALIDATION_PASSED), t(CRON_JOB_CREATED), t(REPOSITORY_FOUND)];
        assert_eq!(
            calculate_backup_invoker_phase(&conditions, Snapshotter::Restic),
            BackupInvokerPhase::NotReady
        );

        let conditions = vec![
            t(VALIDATION_PASSED),
            t(CRON_JOB_CREATED),
            t(REPOSITORY_FOUND),
            Condition::new(BACKEND_SECRET_FOUND, ConditionStatus::Unknown, "Checking", ""),
        ];
        assert_eq!(
            calculate_backup_invoker_phase(&conditions, Snapshotter::Restic),
            BackupInvokerPhase::NotReady
        );
    }

    #[test]
    fn test_ready() {
        let conditions = vec![
            t(REPOSITORY_FOUND),
            t(BACKEND_SECRET_FOUND),
            t(VALIDATION_PASSED),
            t(CRON_JOB_CREATED),
        ];
        assert_eq!(
            calculate_backup_invoker_phase(&conditions, Snapshotter::Restic),
            BackupInvokerPhase::Ready
        );
    }

    #[test]
    fn test_volume_snapshotter_skips_backend_checks() {
        let conditions = vec![t(VALIDATION_PASSED), t(CRON_JOB_CREATED)];
        assert_eq!(
            calculate_backup_invoker_phase(&conditions, Snapshotter::VolumeSnapshotter),
            BackupInvokerPhase::Ready
        );
    }

    #[test]
    fn test_missing_repository_blocks_any_driver() {
        let conditions = vec![
            f(REPOSITORY_FOUND),
            t(VALIDATION_PASSED),
            t(CRON_JOB_CREATED),
        ];
        assert_eq!(
            calculate_backup_invoker_phase(&conditions, Snapshotter::VolumeSnapshotter),
            BackupInvokerPhase::NotReady
        );
    }

    #[test]
    fn test_invalid() {
        let conditions = vec![
            t(REPOSITORY_FOUND),
            t(BACKEND_SECRET_FOUND),
            f(VALIDATION_PASSED),
        ];
        assert_eq!(
            calculate_backup_invoker_phase(&conditions, Snapshotter::Restic),
            BackupInvokerPhase::Invalid
        );
    }

    #[test]
    fn test_waiting_for_cron_job() {
        let conditions = vec![
            t(REPOSITORY_FOUND),
            t(BACKEND_SECRET_FOUND),
            t(VALIDATION_PASSED),
            f(CRON_JOB_CREATED),
        ];
        assert_eq!(
            calculate_backup_invoker_phase(&conditions, Snapshotter::Restic),
            BackupInvokerPhase::NotReady
        );
    }
}
