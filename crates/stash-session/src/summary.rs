//! Session summaries handed to hooks and notifications

use chrono::{DateTime, Utc};
use serde::Serialize;

use stash_common::crd::{
    BackupInvokerRef, BackupSessionStatus, BackupTargetStatus, Condition, ConditionStatus,
    HostBackupPhase, HostRestorePhase, RestoreMemberStatus, TargetRef,
};
use stash_common::duration::format_duration;
use stash_common::target::target_matched;
use stash_common::STASH_API_GROUP;

use crate::invoker::{Invoker, InvokerKind, RestoreInvoker};
use crate::session::BackupSessionStore;

/// Outcome reported in a [`Summary`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SummaryPhase {
    /// No failure was found
    Succeeded,
    /// A host or condition reported a failure
    Failed,
    /// The session could not be read
    Unknown,
}

impl std::fmt::Display for SummaryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// What happened to one target in one session
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Session name
    pub name: String,
    /// Session namespace
    pub namespace: String,
    /// Invoker that ran the session
    pub invoker: BackupInvokerRef,
    /// Target summarized; empty for the whole session
    pub target: TargetRef,
    /// Outcome
    pub phase: SummaryPhase,
    /// First failure reason, or the read error for `Unknown`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time since the session was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl Summary {
    fn new(invoker: (InvokerKind, &str), name: &str, namespace: &str, target: &TargetRef) -> Self {
        let (kind, invoker_name) = invoker;
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            invoker: BackupInvokerRef {
                api_group: STASH_API_GROUP.to_string(),
                kind: kind.to_string(),
                name: invoker_name.to_string(),
            },
            target: target.clone(),
            phase: SummaryPhase::Succeeded,
            error: None,
            duration: None,
        }
    }

    fn unreadable(mut self, kind: &str, err: impl std::fmt::Display) -> Self {
        self.phase = SummaryPhase::Unknown;
        self.error = Some(format!(
            "Unable to summarize target {} state. Reason: {}",
            kind, err
        ));
        self
    }

    fn with_outcome(mut self, failure: Option<String>) -> Self {
        if let Some(reason) = failure {
            self.phase = SummaryPhase::Failed;
            self.error = Some(reason);
        }
        self
    }
}

fn elapsed_since(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<String> {
    created.map(|c| format_duration((now - c).to_std().unwrap_or_default()))
}

fn condition_failure(conditions: &[Condition]) -> Option<String> {
    conditions
        .iter()
        .find(|c| c.status == ConditionStatus::False)
        .map(|c| c.message.clone())
}

fn backup_target_failure(target: &BackupTargetStatus) -> Option<String> {
    target
        .stats
        .iter()
        .find(|h| h.phase == Some(HostBackupPhase::Failed))
        .map(|h| h.error.clone().unwrap_or_default())
        .or_else(|| condition_failure(&target.conditions))
}

fn restore_member_failure(member: &RestoreMemberStatus) -> Option<String> {
    member
        .stats
        .iter()
        .find(|h| {
            h.phase
                .map(|p| p.is_completed() && p != HostRestorePhase::Succeeded)
                .unwrap_or(false)
        })
        .map(|h| h.error.clone().unwrap_or_default())
        .or_else(|| condition_failure(&member.conditions))
}

/// First failure reason for `target` in a backup session.
///
/// An empty target inspects every target status. Host failures win over
/// target conditions, which win over session conditions.
pub fn backup_failure(status: &BackupSessionStatus, target: &TargetRef) -> Option<String> {
    status
        .targets
        .iter()
        .filter(|t| target.name.is_empty() || target_matched(target, &t.ref_))
        .find_map(backup_target_failure)
        .or_else(|| condition_failure(&status.conditions))
}

/// First failure reason for `target` in a restore, same precedence as [`backup_failure`]
pub fn restore_failure(
    members: &[RestoreMemberStatus],
    conditions: &[Condition],
    target: &TargetRef,
) -> Option<String> {
    members
        .iter()
        .filter(|m| target.name.is_empty() || target_matched(target, &m.ref_))
        .find_map(restore_member_failure)
        .or_else(|| condition_failure(conditions))
}

/// Summarize one target of a BackupSession
pub async fn backup_summary(
    sessions: &BackupSessionStore,
    invoker: &dyn Invoker,
    namespace: &str,
    session_name: &str,
    target: &TargetRef,
    now: DateTime<Utc>,
) -> Summary {
    let summary = Summary::new(
        (invoker.kind(), invoker.name()),
        session_name,
        namespace,
        target,
    );
    let session = match sessions.get(namespace, session_name).await {
        Ok(session) => session,
        Err(e) => return summary.unreadable("backup", e),
    };

    let mut summary = summary.with_outcome(backup_failure(
        &session.status.unwrap_or_default(),
        target,
    ));
    summary.duration = elapsed_since(
        session.metadata.creation_timestamp.map(|t| t.0),
        now,
    );
    summary
}

/// Summarize one target of a restore invoker
pub async fn restore_summary(
    invoker: &dyn RestoreInvoker,
    target: &TargetRef,
    now: DateTime<Utc>,
) -> Summary {
    let summary = Summary::new(
        (invoker.kind(), invoker.name()),
        invoker.name(),
        invoker.namespace(),
        target,
    );
    let members = match invoker.members().await {
        Ok(members) => members,
        Err(e) => return summary.unreadable("restore", e),
    };
    let conditions = match invoker.conditions(None).await {
        Ok(conditions) => conditions,
        Err(e) => return summary.unreadable("restore", e),
    };

    let mut summary = summary.with_outcome(restore_failure(&members, &conditions, target));
    summary.duration = elapsed_since(
        invoker.meta().creation_timestamp.as_ref().map(|t| t.0),
        now,
    );
    summary
}
