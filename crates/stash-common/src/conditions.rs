//! Condition ledger
//!
//! A ledger is an ordered list of [`Condition`]s holding at most one entry per
//! condition type. Writers upsert by type (last write wins); readers ask
//! whether a type is present and what its status is. The same ledger shape is
//! used at session level and per target, the latter keyed by [`TargetRef`]
//! through [`MemberConditions`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::{Condition, ConditionStatus, TargetRef};
use crate::target::{target_matched, HasTargetRef};

// Backup-side condition types
/// Backup executor (sidecar, job, or snapshot) was created for a target
pub const BACKUP_EXECUTOR_ENSURED: &str = "BackupExecutorEnsured";
/// Per-target pre-backup hook result
pub const PRE_BACKUP_HOOK_EXECUTION_SUCCEEDED: &str = "PreBackupHookExecutionSucceeded";
/// Per-target post-backup hook result
pub const POST_BACKUP_HOOK_EXECUTION_SUCCEEDED: &str = "PostBackupHookExecutionSucceeded";
/// The backup of a target was interrupted
pub const BACKUP_DISRUPTED: &str = "BackupDisrupted";
/// The session was skipped because another session was running
pub const BACKUP_SKIPPED: &str = "BackupSkipped";
/// Old sessions were cleaned according to the backup history limit
pub const BACKUP_HISTORY_CLEANED: &str = "BackupHistoryCleaned";
/// Retention policy was applied to the repository
pub const RETENTION_POLICY_APPLIED: &str = "RetentionPolicyApplied";
/// Repository metrics were pushed
pub const REPOSITORY_METRICS_PUSHED: &str = "RepositoryMetricsPushed";
/// Repository integrity check passed
pub const REPOSITORY_INTEGRITY_VERIFIED: &str = "RepositoryIntegrityVerified";
/// Session-wide pre-backup hook result
pub const GLOBAL_PRE_BACKUP_HOOK_SUCCEEDED: &str = "GlobalPreBackupHookSucceeded";
/// Session-wide post-backup hook result
pub const GLOBAL_POST_BACKUP_HOOK_SUCCEEDED: &str = "GlobalPostBackupHookSucceeded";
/// The backup CronJob of an invoker exists
pub const CRON_JOB_CREATED: &str = "CronJobCreated";
/// A backup target exists in the cluster
pub const BACKUP_TARGET_FOUND: &str = "BackupTargetFound";
/// The stash sidecar was injected into a backup target
pub const STASH_SIDECAR_INJECTED: &str = "StashSidecarInjected";

// Shared condition types
/// Final metrics push; the last step of every session
pub const METRICS_PUSHED: &str = "MetricsPushed";
/// The session exceeded its deadline
pub const DEADLINE_EXCEEDED: &str = "DeadlineExceeded";
/// The referenced Repository exists
pub const REPOSITORY_FOUND: &str = "RepositoryFound";
/// The storage secret of the Repository exists
pub const BACKEND_SECRET_FOUND: &str = "BackendSecretFound";
/// The invoker passed validation
pub const VALIDATION_PASSED: &str = "ValidationPassed";

// Restore-side condition types
/// Restore executor (init-container or job) was created for a target
pub const RESTORE_EXECUTOR_ENSURED: &str = "RestoreExecutorEnsured";
/// Restorer workload was created (init-container, job or volume)
pub const RESTORER_ENSURED: &str = "RestorerEnsured";
/// The restore target exists in the cluster
pub const RESTORE_TARGET_FOUND: &str = "RestoreTargetFound";
/// Per-target pre-restore hook result
pub const PRE_RESTORE_HOOK_EXECUTION_SUCCEEDED: &str = "PreRestoreHookExecutionSucceeded";
/// Per-target post-restore hook result
pub const POST_RESTORE_HOOK_EXECUTION_SUCCEEDED: &str = "PostRestoreHookExecutionSucceeded";
/// Session-wide pre-restore hook result
pub const GLOBAL_PRE_RESTORE_HOOK_SUCCEEDED: &str = "GlobalPreRestoreHookSucceeded";
/// Session-wide post-restore hook result
pub const GLOBAL_POST_RESTORE_HOOK_SUCCEEDED: &str = "GlobalPostRestoreHookSucceeded";

/// Find the condition of the given type, with its position in the ledger
pub fn get_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<(usize, &'a Condition)> {
    conditions
        .iter()
        .enumerate()
        .find(|(_, c)| c.type_ == condition_type)
}

/// True if a condition of the given type is present, whatever its status
pub fn has_condition(conditions: &[Condition], condition_type: &str) -> bool {
    get_condition(conditions, condition_type).is_some()
}

fn has_status(conditions: &[Condition], condition_type: &str, status: ConditionStatus) -> bool {
    get_condition(conditions, condition_type)
        .map(|(_, c)| c.status == status)
        .unwrap_or(false)
}

/// True if the condition exists with status `True`
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    has_status(conditions, condition_type, ConditionStatus::True)
}

/// True if the condition exists with status `False`
pub fn is_condition_false(conditions: &[Condition], condition_type: &str) -> bool {
    has_status(conditions, condition_type, ConditionStatus::False)
}

/// True if the condition exists with status `Unknown`
pub fn is_condition_unknown(conditions: &[Condition], condition_type: &str) -> bool {
    has_status(conditions, condition_type, ConditionStatus::Unknown)
}

/// Upsert a condition by type.
///
/// An existing entry keeps its position and, when the status did not
/// change, its original `lastTransitionTime`.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == new.type_) {
        Some(existing) => {
            let transition_time = if existing.status == new.status {
                existing.last_transition_time
            } else {
                new.last_transition_time
            };
            *existing = Condition {
                last_transition_time: transition_time,
                ..new
            };
        }
        None => conditions.push(new),
    }
}

/// Upsert every condition of `new` into `conditions`, in order
pub fn upsert_conditions(conditions: &mut Vec<Condition>, new: &[Condition]) {
    for condition in new {
        set_condition(conditions, condition.clone());
    }
}

/// Conditions attached to a single member (target) of an invoker
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberConditions {
    /// The member these conditions belong to
    pub target: TargetRef,
    /// The member's ledger
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl HasTargetRef for MemberConditions {
    fn target_ref(&self) -> &TargetRef {
        &self.target
    }
}

/// Look up the ledger of a member; `None` when the member has no entry yet
pub fn member_conditions<'a>(
    members: &'a [MemberConditions],
    target: &TargetRef,
) -> Option<&'a [Condition]> {
    members
        .iter()
        .find(|m| target_matched(&m.target, target))
        .map(|m| m.conditions.as_slice())
}

/// Upsert a condition into a member's ledger, creating the member on first write
pub fn set_member_condition(
    members: &mut Vec<MemberConditions>,
    target: &TargetRef,
    new: Condition,
) {
    match members
        .iter_mut()
        .find(|m| target_matched(&m.target, target))
    {
        Some(member) => set_condition(&mut member.conditions, new),
        None => members.push(MemberConditions {
            target: target.clone(),
            conditions: vec![new],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn deployment(name: &str) -> TargetRef {
        TargetRef::new("apps/v1", "Deployment", name, "demo")
    }

    mod ledger {
        use super::*;

        #[test]
        fn test_at_most_one_condition_per_type() {
            let mut ledger = Vec::new();
            set_condition(&mut ledger, Condition::truthy(METRICS_PUSHED, "Pushed"));
            set_condition(
                &mut ledger,
                Condition::falsy(METRICS_PUSHED, "PushFailed", "timeout"),
            );
            set_condition(&mut ledger, Condition::truthy(REPOSITORY_FOUND, "Found"));

            assert_eq!(ledger.len(), 2);
            assert!(is_condition_false(&ledger, METRICS_PUSHED));
            assert_eq!(get_condition(&ledger, METRICS_PUSHED).unwrap().0, 0);
            assert_eq!(get_condition(&ledger, REPOSITORY_FOUND).unwrap().0, 1);
        }

        #[test]
        fn test_transition_time_kept_when_status_unchanged() {
            let mut ledger = Vec::new();
            let mut first = Condition::truthy(VALIDATION_PASSED, "Valid");
            first.last_transition_time = Utc::now() - Duration::hours(1);
            let original_time = first.last_transition_time;
            set_condition(&mut ledger, first);

            set_condition(&mut ledger, Condition::truthy(VALIDATION_PASSED, "StillValid"));
            assert_eq!(ledger[0].last_transition_time, original_time);
            assert_eq!(ledger[0].reason, "StillValid");

            set_condition(
                &mut ledger,
                Condition::falsy(VALIDATION_PASSED, "Invalid", "bad schedule"),
            );
            assert!(ledger[0].last_transition_time > original_time);
        }

        #[test]
        fn test_status_queries_on_missing_type() {
            let ledger = vec![Condition::new(
                REPOSITORY_FOUND,
                ConditionStatus::Unknown,
                "Checking",
                "",
            )];
            assert!(!is_condition_true(&ledger, METRICS_PUSHED));
            assert!(!is_condition_false(&ledger, METRICS_PUSHED));
            assert!(!has_condition(&ledger, METRICS_PUSHED));
            assert!(is_condition_unknown(&ledger, REPOSITORY_FOUND));
        }

        #[test]
        fn test_upsert_is_idempotent() {
            let fragment = vec![
                Condition::truthy(RETENTION_POLICY_APPLIED, "Applied"),
                Condition::truthy(METRICS_PUSHED, "Pushed"),
            ];
            let mut once = Vec::new();
            upsert_conditions(&mut once, &fragment);
            let mut twice = once.clone();
            upsert_conditions(&mut twice, &fragment);
            assert_eq!(once, twice);
        }
    }

    mod members {
        use super::*;

        #[test]
        fn test_member_created_on_first_write() {
            let mut members = Vec::new();
            assert!(member_conditions(&members, &deployment("web")).is_none());

            set_member_condition(
                &mut members,
                &deployment("web"),
                Condition::truthy(BACKUP_TARGET_FOUND, "Found"),
            );
            set_member_condition(
                &mut members,
                &deployment("web"),
                Condition::truthy(STASH_SIDECAR_INJECTED, "Injected"),
            );
            set_member_condition(
                &mut members,
                &deployment("db"),
                Condition::falsy(BACKUP_TARGET_FOUND, "Missing", "not found"),
            );

            assert_eq!(members.len(), 2);
            let web = member_conditions(&members, &deployment("web")).unwrap();
            assert_eq!(web.len(), 2);
            let db = member_conditions(&members, &deployment("db")).unwrap();
            assert!(is_condition_false(db, BACKUP_TARGET_FOUND));
        }
    }
}
