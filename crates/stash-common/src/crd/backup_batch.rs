//! BackupBatch Custom Resource Definition
//!
//! A BackupBatch backs up several targets under one schedule and one
//! repository. Members run in parallel unless `executionOrder: Sequential`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::backup_configuration::{BackupConfigurationTemplateSpec, BackupInvokerPhase};
use super::types::{
    BackupHooks, Condition, ExecutionOrder, ObjectReference, RetentionPolicy, RuntimeSettings,
    SessionRetryConfig, Snapshotter,
};
use crate::conditions::MemberConditions;

/// Status of a BackupBatch
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupBatchStatus {
    /// Generation most recently observed by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Readiness phase derived from the conditions
    #[serde(default)]
    pub phase: BackupInvokerPhase,

    /// Invoker-level condition ledger
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Per-member condition ledgers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member_conditions: Vec<MemberConditions>,
}

/// Specification for a BackupBatch
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "stash.appscode.com",
    version = "v1beta1",
    kind = "BackupBatch",
    plural = "backupbatches",
    shortname = "bb",
    namespaced,
    status = "BackupBatchStatus",
    printcolumn = r#"{"name":"Schedule","type":"string","jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Paused","type":"boolean","jsonPath":".spec.paused"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupBatchSpec {
    /// Backup mechanism; Restic when unset
    #[serde(default)]
    pub driver: Snapshotter,

    /// Repository shared by every member
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<ObjectReference>,

    /// Targets backed up by this batch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<BackupConfigurationTemplateSpec>,

    /// Cron expression for the backup schedule
    #[serde(default)]
    pub schedule: String,

    /// Runtime settings of the backup job that runs global hooks and retention
    #[serde(default)]
    pub runtime_settings: RuntimeSettings,

    /// How many snapshots to keep
    #[serde(default)]
    pub retention_policy: RetentionPolicy,

    /// Suspend scheduling of new sessions
    #[serde(default)]
    pub paused: bool,

    /// Number of finished BackupSessions to keep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_history_limit: Option<i32>,

    /// Hooks run once per session, around all members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<BackupHooks>,

    /// Order in which members are backed up
    #[serde(default)]
    pub execution_order: ExecutionOrder,

    /// Maximum duration of a session (e.g., 30m)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_out: Option<String>,

    /// Retry settings for failed sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<SessionRetryConfig>,
}
