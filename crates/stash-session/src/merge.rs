//! Pure status merge functions
//!
//! Executors send partial statuses. Merging is keyed upsert all the way down:
//! conditions by type, targets by reference, hosts by hostname, actions as
//! ordered sets. Applying the same fragment twice yields the same status as
//! applying it once.

use chrono::{DateTime, Utc};

use stash_common::conditions::upsert_conditions;
use stash_common::crd::{
    BackupSessionPhase, BackupSessionStatus, BackupTargetStatus, Condition, HostBackupStats,
    HostRestoreStats, RestoreBatchStatus, RestoreMemberStatus, RestorePhase,
    RestoreSessionStatus, TargetRef,
};
use stash_common::duration::format_duration;
use stash_common::target::{find_by_target_mut, target_matched};

use crate::phase::{
    calculate_backup_session_phase, calculate_backup_target_phase,
    calculate_restore_batch_phase, calculate_restore_session_phase,
    calculate_restore_target_phase,
};

/// Partial status reported for a restore invoker (RestoreSession or RestoreBatch)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RestoreStatusUpdate {
    /// Session-level conditions to upsert
    pub conditions: Vec<Condition>,
    /// Member fragments to upsert
    pub members: Vec<RestoreMemberStatus>,
    /// Deadline; only applied when none is set yet
    pub session_deadline: Option<DateTime<Utc>>,
}

/// `totalHosts` never decreases once set
fn merge_total_hosts(current: Option<i32>, new: Option<i32>) -> Option<i32> {
    match (current, new) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn upsert_actions(actions: &mut Vec<String>, new: &[String]) {
    for action in new {
        if !actions.contains(action) {
            actions.push(action.clone());
        }
    }
}

fn upsert_backup_hosts(stats: &mut Vec<HostBackupStats>, new: &[HostBackupStats]) {
    for host in new {
        match stats.iter_mut().find(|h| h.hostname == host.hostname) {
            Some(existing) => *existing = host.clone(),
            None => stats.push(host.clone()),
        }
    }
}

fn upsert_restore_hosts(stats: &mut Vec<HostRestoreStats>, new: &[HostRestoreStats]) {
    for host in new {
        match stats.iter_mut().find(|h| h.hostname == host.hostname) {
            Some(existing) => *existing = host.clone(),
            None => stats.push(host.clone()),
        }
    }
}

/// Upsert a backup target fragment and recompute its phase
pub fn upsert_backup_target(targets: &mut Vec<BackupTargetStatus>, new: &BackupTargetStatus) {
    match find_by_target_mut(targets, &new.ref_) {
        Some(existing) => {
            upsert_conditions(&mut existing.conditions, &new.conditions);
            existing.total_hosts = merge_total_hosts(existing.total_hosts, new.total_hosts);
            upsert_backup_hosts(&mut existing.stats, &new.stats);
            upsert_actions(&mut existing.pre_backup_actions, &new.pre_backup_actions);
            upsert_actions(&mut existing.post_backup_actions, &new.post_backup_actions);
            existing.phase = calculate_backup_target_phase(existing);
        }
        None => {
            let mut entry = new.clone();
            entry.phase = calculate_backup_target_phase(&entry);
            targets.push(entry);
        }
    }
}

/// Upsert a restore member fragment and recompute its phase
pub fn upsert_restore_member(members: &mut Vec<RestoreMemberStatus>, new: &RestoreMemberStatus) {
    match find_by_target_mut(members, &new.ref_) {
        Some(existing) => {
            upsert_conditions(&mut existing.conditions, &new.conditions);
            existing.total_hosts = merge_total_hosts(existing.total_hosts, new.total_hosts);
            upsert_restore_hosts(&mut existing.stats, &new.stats);
            existing.phase = calculate_restore_target_phase(existing);
        }
        None => {
            let mut entry = new.clone();
            entry.phase = calculate_restore_target_phase(&entry);
            members.push(entry);
        }
    }
}

fn elapsed(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format_duration((now - created).to_std().unwrap_or_default())
}

fn latch_backup(current: BackupSessionPhase, computed: BackupSessionPhase) -> BackupSessionPhase {
    if current.is_terminal() && !computed.is_terminal() {
        current
    } else {
        computed
    }
}

fn latch_restore(current: RestorePhase, computed: RestorePhase) -> RestorePhase {
    if current.is_terminal() && !computed.is_terminal() {
        current
    } else {
        computed
    }
}

/// Merge a partial BackupSession status into the current one.
///
/// `sessionDeadline`, `retried` and `nextRetry` are only taken from the
/// fragment when unset. `sessionDuration` is stamped once, on the first merge
/// that observes a terminal phase.
pub fn merge_backup_session_status(
    current: &BackupSessionStatus,
    partial: &BackupSessionStatus,
    created: DateTime<Utc>,
    now: DateTime<Utc>,
) -> BackupSessionStatus {
    let mut merged = current.clone();

    upsert_conditions(&mut merged.conditions, &partial.conditions);
    for target in &partial.targets {
        upsert_backup_target(&mut merged.targets, target);
    }

    merged.phase = latch_backup(current.phase, calculate_backup_session_phase(&merged));

    if merged.phase.is_terminal() && merged.session_duration.is_none() {
        merged.session_duration = Some(elapsed(created, now));
    }
    if merged.session_deadline.is_none() {
        merged.session_deadline = partial.session_deadline;
    }
    if merged.retried.is_none() {
        merged.retried = partial.retried;
    }
    if merged.next_retry.is_none() {
        merged.next_retry = partial.next_retry;
    }
    merged
}

/// Merge a partial status into a RestoreBatch status.
///
/// `total_targets` is the number of members declared in the spec.
pub fn merge_restore_batch_status(
    current: &RestoreBatchStatus,
    partial: &RestoreStatusUpdate,
    total_targets: usize,
    created: DateTime<Utc>,
    now: DateTime<Utc>,
) -> RestoreBatchStatus {
    let mut merged = current.clone();

    upsert_conditions(&mut merged.conditions, &partial.conditions);
    for member in &partial.members {
        upsert_restore_member(&mut merged.members, member);
    }

    merged.phase = latch_restore(
        current.phase,
        calculate_restore_batch_phase(&merged, total_targets),
    );

    if merged.phase.is_terminal() && merged.session_duration.is_none() {
        merged.session_duration = Some(elapsed(created, now));
    }
    if merged.session_deadline.is_none() {
        merged.session_deadline = partial.session_deadline;
    }
    merged
}

/// View a RestoreSession status as its single member
pub fn restore_session_member(status: &RestoreSessionStatus, target: &TargetRef) -> RestoreMemberStatus {
    let mut member = RestoreMemberStatus {
        ref_: target.clone(),
        conditions: status.conditions.clone(),
        total_hosts: status.total_hosts,
        stats: status.stats.clone(),
        ..Default::default()
    };
    member.phase = calculate_restore_target_phase(&member);
    member
}

/// Merge a partial status into a RestoreSession status.
///
/// Session-level conditions and fragments for `target` all land in the one
/// ledger the session has; fragments for other targets are ignored.
pub fn merge_restore_session_status(
    current: &RestoreSessionStatus,
    target: &TargetRef,
    partial: &RestoreStatusUpdate,
    created: DateTime<Utc>,
    now: DateTime<Utc>,
) -> RestoreSessionStatus {
    let mut members = vec![restore_session_member(current, target)];
    let session_fragment = RestoreMemberStatus {
        ref_: target.clone(),
        conditions: partial.conditions.clone(),
        ..Default::default()
    };
    upsert_restore_member(&mut members, &session_fragment);
    for fragment in partial
        .members
        .iter()
        .filter(|m| target_matched(&m.ref_, target))
    {
        upsert_restore_member(&mut members, fragment);
    }
    let member = &members[0];

    let mut merged = current.clone();
    merged.conditions = member.conditions.clone();
    merged.total_hosts = member.total_hosts;
    merged.stats = member.stats.clone();
    merged.phase = latch_restore(current.phase, calculate_restore_session_phase(member));

    if merged.phase.is_terminal() && merged.session_duration.is_none() {
        merged.session_duration = Some(elapsed(created, now));
    }
    if merged.session_deadline.is_none() {
        merged.session_deadline = partial.session_deadline;
    }
    merged
}
