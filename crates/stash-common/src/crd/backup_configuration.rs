//! BackupConfiguration Custom Resource Definition
//!
//! A BackupConfiguration is the single-target backup invoker: one target,
//! a cron schedule, a repository and a retention policy. Each scheduling tick
//! produces a BackupSession that references it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    BackupHooks, BackupTarget, Condition, EmptyDirSettings, ObjectReference,
    PersistentVolumeClaimTemplate, RetentionPolicy, RuntimeSettings, SessionRetryConfig,
    Snapshotter, TaskRef,
};

/// Per-target part of a backup invoker; shared with BackupBatch members
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfigurationTemplateSpec {
    /// Task that performs the backup
    #[serde(default)]
    pub task: TaskRef,

    /// Target to back up; absent for cluster-wide backups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<BackupTarget>,

    /// Runtime settings of the backup sidecar or job
    #[serde(default)]
    pub runtime_settings: RuntimeSettings,

    /// Temporary directory settings
    #[serde(default)]
    pub temp_dir: EmptyDirSettings,

    /// Template of the interim volume used to stage data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interim_volume_template: Option<PersistentVolumeClaimTemplate>,

    /// Hooks run around the backup of this target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<BackupHooks>,
}

/// Readiness of a backup invoker
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum BackupInvokerPhase {
    /// Every prerequisite is satisfied and the CronJob exists
    Ready,
    /// Waiting for the repository, backend secret or CronJob
    #[default]
    NotReady,
    /// The invoker failed validation
    Invalid,
}

impl std::fmt::Display for BackupInvokerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready"),
            Self::NotReady => write!(f, "NotReady"),
            Self::Invalid => write!(f, "Invalid"),
        }
    }
}

/// Status of a BackupConfiguration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfigurationStatus {
    /// Generation most recently observed by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Readiness phase derived from the conditions
    #[serde(default)]
    pub phase: BackupInvokerPhase,

    /// Invoker-level condition ledger
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Specification for a BackupConfiguration
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "stash.appscode.com",
    version = "v1beta1",
    kind = "BackupConfiguration",
    plural = "backupconfigurations",
    shortname = "bc",
    namespaced,
    status = "BackupConfigurationStatus",
    printcolumn = r#"{"name":"Task","type":"string","jsonPath":".spec.task.name"}"#,
    printcolumn = r#"{"name":"Schedule","type":"string","jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Paused","type":"boolean","jsonPath":".spec.paused"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfigurationSpec {
    /// What to back up and how
    #[serde(flatten)]
    pub template: BackupConfigurationTemplateSpec,

    /// Cron expression for the backup schedule
    #[serde(default)]
    pub schedule: String,

    /// Backup mechanism; Restic when unset
    #[serde(default)]
    pub driver: Snapshotter,

    /// Repository the backed-up data is stored in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<ObjectReference>,

    /// How many snapshots to keep
    #[serde(default)]
    pub retention_policy: RetentionPolicy,

    /// Suspend scheduling of new sessions
    #[serde(default)]
    pub paused: bool,

    /// Number of finished BackupSessions to keep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_history_limit: Option<i32>,

    /// Maximum duration of a session (e.g., 30m)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_out: Option<String>,

    /// Retry settings for failed sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<SessionRetryConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::TargetRef;

    fn parse_spec(yaml: &str) -> BackupConfigurationSpec {
        let value = crate::yaml::parse_yaml(yaml).expect("parse yaml");
        serde_json::from_value(value).expect("parse spec")
    }

    #[test]
    fn test_flattened_template_parses() {
        let spec = parse_spec(
            r#"
schedule: "*/5 * * * *"
repository:
  name: gcs-repo
target:
  ref:
    apiVersion: apps/v1
    kind: Deployment
    name: stash-demo
  paths:
    - /source/data
retentionPolicy:
  name: keep-last-5
  keepLast: 5
  prune: true
retryConfig:
  maxRetry: 2
  delay: 5m
"#,
        );

        let target = spec.template.target.as_ref().expect("target");
        assert_eq!(
            target.ref_,
            TargetRef::new("apps/v1", "Deployment", "stash-demo", "")
        );
        assert_eq!(target.paths, vec!["/source/data"]);
        assert_eq!(spec.schedule, "*/5 * * * *");
        assert_eq!(spec.retention_policy.keep_last, 5);
        assert_eq!(spec.retry_config.as_ref().map(|r| r.max_retry), Some(2));
    }

    #[test]
    fn test_defaults() {
        let spec = parse_spec("schedule: \"@hourly\"\n");
        assert_eq!(spec.driver, Snapshotter::Restic);
        assert!(!spec.paused);
        assert!(spec.template.target.is_none());
        assert!(spec.retention_policy.is_empty());
    }

    #[test]
    fn test_volume_snapshotter_driver() {
        let spec = parse_spec(
            r#"
driver: VolumeSnapshotter
schedule: "0 * * * *"
target:
  ref:
    apiVersion: apps/v1
    kind: StatefulSet
    name: db
  replicas: 3
  snapshotClassName: csi-snapshot-class
"#,
        );
        assert_eq!(spec.driver, Snapshotter::VolumeSnapshotter);
        let target = spec.template.target.unwrap();
        assert_eq!(target.replicas, Some(3));
        assert_eq!(target.snapshot_class_name.as_deref(), Some("csi-snapshot-class"));
    }

    #[test]
    fn test_invoker_phase_display() {
        assert_eq!(BackupInvokerPhase::Ready.to_string(), "Ready");
        assert_eq!(BackupInvokerPhase::NotReady.to_string(), "NotReady");
        assert_eq!(BackupInvokerPhase::Invalid.to_string(), "Invalid");
    }
}
