//! RestoreSession Custom Resource Definition
//!
//! A RestoreSession restores a single target. It is its own invoker and its
//! own session: the spec declares the target, the status tracks progress.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    Condition, EmptyDirSettings, ObjectReference, PersistentVolumeClaimTemplate, RestoreHooks,
    RestoreTarget, Rule, RuntimeSettings, Snapshotter, TaskRef,
};

/// Per-target part of a restore invoker; shared with RestoreBatch members
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreTargetSpec {
    /// Task that performs the restore
    #[serde(default)]
    pub task: TaskRef,

    /// Where to restore; absent for cluster-wide restores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<RestoreTarget>,

    /// Runtime settings of the restore init-container or job
    #[serde(default)]
    pub runtime_settings: RuntimeSettings,

    /// Temporary directory settings
    #[serde(default)]
    pub temp_dir: EmptyDirSettings,

    /// Template of the interim volume used to stage data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interim_volume_template: Option<PersistentVolumeClaimTemplate>,

    /// Hooks run around the restore of this target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<RestoreHooks>,
}

/// Phase of a RestoreSession or RestoreBatch
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RestorePhase {
    /// Waiting for prerequisites or host reports
    #[default]
    Pending,
    /// Restore in progress
    Running,
    /// Every host restored successfully
    Succeeded,
    /// A host or a required step failed
    Failed,
    /// Outcome could not be determined
    Unknown,
    /// The invoker failed validation
    Invalid,
}

impl RestorePhase {
    /// Terminal phases are final once reached
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Unknown)
    }
}

impl std::fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown => write!(f, "Unknown"),
            Self::Invalid => write!(f, "Invalid"),
        }
    }
}

/// Outcome reported by one restored host
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum HostRestorePhase {
    /// Host restore succeeded
    Succeeded,
    /// Host restore failed
    Failed,
    /// Host restore in progress
    Running,
    /// Host outcome could not be determined
    Unknown,
}

impl HostRestorePhase {
    /// Succeeded, Failed or Unknown
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Unknown)
    }
}

impl std::fmt::Display for HostRestorePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Running => write!(f, "Running"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Restore report of one host
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostRestoreStats {
    /// Host identifier
    pub hostname: String,
    /// Host outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<HostRestorePhase>,
    /// Time spent restoring the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status of a RestoreSession
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSessionStatus {
    /// Overall phase
    #[serde(default)]
    pub phase: RestorePhase,
    /// Number of hosts expected to report; never decreases once set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_hosts: Option<i32>,
    /// Wall time from creation to completion; stamped once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_duration: Option<String>,
    /// Per-host reports, unique by hostname
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stats: Vec<HostRestoreStats>,
    /// Condition ledger
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Time after which the session is considered timed out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_deadline: Option<DateTime<Utc>>,
}

/// Specification for a RestoreSession
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "stash.appscode.com",
    version = "v1beta1",
    kind = "RestoreSession",
    plural = "restoresessions",
    namespaced,
    status = "RestoreSessionStatus",
    printcolumn = r#"{"name":"Repository","type":"string","jsonPath":".spec.repository.name"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Duration","type":"string","jsonPath":".status.sessionDuration"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSessionSpec {
    /// What to restore and how
    #[serde(flatten)]
    pub template: RestoreTargetSpec,

    /// Restore mechanism; Restic when unset
    #[serde(default)]
    pub driver: Snapshotter,

    /// Repository the data is restored from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<ObjectReference>,

    /// Legacy per-host rules; prefer `target.rules`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,

    /// Maximum duration of the restore (e.g., 30m)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_out: Option<String>,
}
