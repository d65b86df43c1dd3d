//! RestoreBatch Custom Resource Definition
//!
//! A RestoreBatch restores several targets from one repository. Like
//! RestoreSession it is both invoker and session.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::restore_session::{HostRestoreStats, RestorePhase, RestoreTargetSpec};
use super::types::{
    Condition, ExecutionOrder, ObjectReference, RestoreHooks, Snapshotter, TargetRef,
};
use crate::target::HasTargetRef;

/// Phase of one member of a RestoreBatch
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RestoreTargetPhase {
    /// Total host count not known yet
    #[default]
    Pending,
    /// Some hosts have not reported
    Running,
    /// Every host succeeded
    Succeeded,
    /// A host or a per-target step failed
    Failed,
    /// A host outcome could not be determined
    Unknown,
}

impl RestoreTargetPhase {
    /// Succeeded, Failed or Unknown
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Unknown)
    }
}

impl std::fmt::Display for RestoreTargetPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Progress of one member of a RestoreBatch
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreMemberStatus {
    /// The member this entry belongs to
    #[serde(rename = "ref", default)]
    pub ref_: TargetRef,
    /// Per-member condition ledger
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Number of hosts expected to report; never decreases once set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_hosts: Option<i32>,
    /// Phase derived from the conditions and host reports
    #[serde(default)]
    pub phase: RestoreTargetPhase,
    /// Per-host reports, unique by hostname
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stats: Vec<HostRestoreStats>,
}

impl HasTargetRef for RestoreMemberStatus {
    fn target_ref(&self) -> &TargetRef {
        &self.ref_
    }
}

/// Status of a RestoreBatch
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreBatchStatus {
    /// Overall phase
    #[serde(default)]
    pub phase: RestorePhase,
    /// Wall time from creation to completion; stamped once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_duration: Option<String>,
    /// Batch-level condition ledger
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Per-member progress, unique by target reference
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<RestoreMemberStatus>,
    /// Time after which the batch is considered timed out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_deadline: Option<DateTime<Utc>>,
}

/// Specification for a RestoreBatch
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "stash.appscode.com",
    version = "v1beta1",
    kind = "RestoreBatch",
    plural = "restorebatches",
    namespaced,
    status = "RestoreBatchStatus",
    printcolumn = r#"{"name":"Repository","type":"string","jsonPath":".spec.repository.name"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Duration","type":"string","jsonPath":".status.sessionDuration"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RestoreBatchSpec {
    /// Restore mechanism; Restic when unset
    #[serde(default)]
    pub driver: Snapshotter,

    /// Repository the data is restored from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<ObjectReference>,

    /// Targets restored by this batch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<RestoreTargetSpec>,

    /// Order in which members are restored
    #[serde(default)]
    pub execution_order: ExecutionOrder,

    /// Hooks run once, around all members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<RestoreHooks>,

    /// Maximum duration of the restore (e.g., 30m)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_out: Option<String>,
}
