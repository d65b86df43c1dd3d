//! BackupSession Custom Resource Definition
//!
//! One BackupSession is created per scheduling tick (or per retry) of a
//! backup invoker. Executors report per-target and per-host progress into its
//! status; the session phase is derived from those reports.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, TargetRef};
use crate::target::HasTargetRef;

/// Reference from a session to the invoker that created it
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupInvokerRef {
    /// API group of the invoker (stash.appscode.com)
    #[serde(default)]
    pub api_group: String,
    /// BackupConfiguration or BackupBatch
    pub kind: String,
    /// Invoker name
    pub name: String,
}

/// Lifecycle phase of a BackupSession
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum BackupSessionPhase {
    /// Created, no target has started
    #[default]
    Pending,
    /// Skipped because another session was running
    Skipped,
    /// At least one target is in progress
    Running,
    /// Every target succeeded and post-processing completed
    Succeeded,
    /// Some target or post-processing step failed
    Failed,
    /// Outcome could not be determined
    Unknown,
}

impl BackupSessionPhase {
    /// Terminal phases are final once reached
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Unknown
        )
    }
}

impl std::fmt::Display for BackupSessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Skipped => write!(f, "Skipped"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Phase of one target within a BackupSession
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum BackupTargetPhase {
    /// Total host count not known yet
    #[default]
    Pending,
    /// Some hosts have not reported
    Running,
    /// Every host succeeded
    Succeeded,
    /// A host or a per-target step failed
    Failed,
}

impl BackupTargetPhase {
    /// Succeeded or Failed
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for BackupTargetPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Outcome reported by one host
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum HostBackupPhase {
    /// Host backup succeeded
    Succeeded,
    /// Host backup failed
    Failed,
}

impl std::fmt::Display for HostBackupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// File counters of one snapshot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    /// Files in the snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_files: Option<i64>,
    /// Files added since the previous snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_files: Option<i64>,
    /// Files modified since the previous snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_files: Option<i64>,
    /// Files unchanged since the previous snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmodified_files: Option<i64>,
}

/// One snapshot taken for a host
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    /// Snapshot identifier
    #[serde(default)]
    pub name: String,
    /// Backed-up path
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Size of the backed-up data
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub total_size: String,
    /// Data uploaded for this snapshot
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uploaded: String,
    /// Time spent taking the snapshot
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub processing_time: String,
    /// File counters
    #[serde(default)]
    pub file_stats: FileStats,
}

/// Backup report of one host (pod or replica) of a target
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostBackupStats {
    /// Host identifier (pod name, ordinal host or PVC name)
    pub hostname: String,
    /// Host outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<HostBackupPhase>,
    /// Snapshots taken
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<SnapshotStats>,
    /// Time spent backing up the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Progress of one target within a BackupSession
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupTargetStatus {
    /// The target this entry belongs to
    #[serde(rename = "ref", default)]
    pub ref_: TargetRef,
    /// Number of hosts expected to report; never decreases once set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_hosts: Option<i32>,
    /// Phase derived from the conditions and host reports
    #[serde(default)]
    pub phase: BackupTargetPhase,
    /// Per-host reports, unique by hostname
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stats: Vec<HostBackupStats>,
    /// Per-target condition ledger
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Actions completed before the backup (e.g., InitializeBackendRepository)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_backup_actions: Vec<String>,
    /// Actions completed after the backup (e.g., ApplyRetentionPolicy)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_backup_actions: Vec<String>,
}

impl HasTargetRef for BackupTargetStatus {
    fn target_ref(&self) -> &TargetRef {
        &self.ref_
    }
}

/// Status of a BackupSession
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSessionStatus {
    /// Overall phase
    #[serde(default)]
    pub phase: BackupSessionPhase,
    /// Wall time from creation to completion; stamped once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_duration: Option<String>,
    /// Per-target progress, unique by target reference
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<BackupTargetStatus>,
    /// Session-level condition ledger
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Time after which the session is considered timed out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_deadline: Option<DateTime<Utc>>,
    /// Whether a retry session was created for this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retried: Option<bool>,
    /// When the retry session will be created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry: Option<DateTime<Utc>>,
}

/// Specification for a BackupSession
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "stash.appscode.com",
    version = "v1beta1",
    kind = "BackupSession",
    plural = "backupsessions",
    namespaced,
    status = "BackupSessionStatus",
    printcolumn = r#"{"name":"Invoker-Type","type":"string","jsonPath":".spec.invoker.kind"}"#,
    printcolumn = r#"{"name":"Invoker-Name","type":"string","jsonPath":".spec.invoker.name"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Duration","type":"string","jsonPath":".status.sessionDuration"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupSessionSpec {
    /// Invoker that created this session
    pub invoker: BackupInvokerRef,
    /// Remaining retries for this chain of sessions
    #[serde(default)]
    pub retry_left: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(BackupSessionPhase::Succeeded.is_terminal());
        assert!(BackupSessionPhase::Failed.is_terminal());
        assert!(BackupSessionPhase::Skipped.is_terminal());
        assert!(BackupSessionPhase::Unknown.is_terminal());
        assert!(!BackupSessionPhase::Pending.is_terminal());
        assert!(!BackupSessionPhase::Running.is_terminal());
    }

    #[test]
    fn test_target_completion() {
        assert!(BackupTargetPhase::Succeeded.is_completed());
        assert!(BackupTargetPhase::Failed.is_completed());
        assert!(!BackupTargetPhase::Running.is_completed());
        assert!(!BackupTargetPhase::Pending.is_completed());
    }

    #[test]
    fn test_status_parses_executor_report() {
        let value = crate::yaml::parse_yaml(
            r#"
phase: Running
targets:
  - ref:
      apiVersion: apps/v1
      kind: StatefulSet
      name: db
      namespace: demo
    totalHosts: 2
    phase: Running
    stats:
      - hostname: host-0
        phase: Succeeded
        duration: 12s
        snapshots:
          - name: 4ee2a8f5
            path: /var/lib/mysql
            totalSize: 120 MiB
            fileStats:
              totalFiles: 42
    preBackupActions:
      - InitializeBackendRepository
"#,
        )
        .expect("parse yaml");
        let status: BackupSessionStatus = serde_json::from_value(value).expect("parse status");

        assert_eq!(status.phase, BackupSessionPhase::Running);
        let target = &status.targets[0];
        assert_eq!(target.total_hosts, Some(2));
        assert_eq!(target.stats[0].phase, Some(HostBackupPhase::Succeeded));
        assert_eq!(target.stats[0].snapshots[0].file_stats.total_files, Some(42));
        assert_eq!(target.pre_backup_actions, vec!["InitializeBackendRepository"]);
        assert!(status.session_deadline.is_none());
    }

    #[test]
    fn test_phase_display_matches_wire_literals() {
        for phase in [
            BackupSessionPhase::Pending,
            BackupSessionPhase::Skipped,
            BackupSessionPhase::Running,
            BackupSessionPhase::Succeeded,
            BackupSessionPhase::Failed,
            BackupSessionPhase::Unknown,
        ] {
            let json = serde_json::to_value(phase).unwrap();
            assert_eq!(json, serde_json::Value::String(phase.to_string()));
        }
    }
}
