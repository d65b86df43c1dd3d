//! Invoker Abstraction
//!
//! BackupConfiguration, BackupBatch, RestoreSession and RestoreBatch each
//! declare targets in their own shape. The adapters in this module translate
//! them into one interface: an ordered list of target infos, the invoker-wide
//! settings, and condition accessors that read and write through the
//! [`ResourceStore`] with conflict retry.
//!
//! Conditions are always read fresh from the store; the adapter's own copy
//! of the object is the snapshot taken at extraction time.

mod backup_batch;
mod backup_configuration;
mod restore_batch;
mod restore_session;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use k8s_openapi::api::core::v1::VolumeMount;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Client;

use stash_common::conditions::{get_condition, has_condition, is_condition_true};
use stash_common::crd::{
    BackupBatch, BackupConfiguration, BackupHooks, BackupInvokerRef, BackupSession,
    BackupSessionSpec, BackupTarget, Condition, EmptyDirSettings, ExecutionOrder, ObjectReference,
    PersistentVolumeClaimTemplate, RestoreBatch, RestoreHooks, RestoreMemberStatus, RestorePhase,
    RestoreSession, RestoreTarget, RetentionPolicy, RuntimeSettings, SessionRetryConfig,
    Snapshotter, TargetRef, TaskRef,
};
use stash_common::duration::parse_duration;
use stash_common::target::with_default_namespace;
use stash_common::{
    Error, Result, LABEL_INVOKER_NAME, LABEL_INVOKER_TYPE, LABEL_TARGET_KIND, LABEL_TARGET_NAME,
    LABEL_TARGET_NAMESPACE, STASH_API_GROUP, STASH_API_VERSION,
};

use crate::coordinator::is_eligible;
use crate::merge::RestoreStatusUpdate;
use crate::store::{KubeStore, ResourceStore, StatusStoreConfig};

pub use backup_batch::BackupBatchInvoker;
pub use backup_configuration::BackupConfigurationInvoker;
pub use restore_batch::RestoreBatchInvoker;
pub use restore_session::RestoreSessionInvoker;

/// The four invoker variants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvokerKind {
    /// Single-target backup invoker
    BackupConfiguration,
    /// Multi-target backup invoker
    BackupBatch,
    /// Single-target restore invoker
    RestoreSession,
    /// Multi-target restore invoker
    RestoreBatch,
}

impl InvokerKind {
    /// Kind string as it appears in `apiVersion`/`kind` pairs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackupConfiguration => "BackupConfiguration",
            Self::BackupBatch => "BackupBatch",
            Self::RestoreSession => "RestoreSession",
            Self::RestoreBatch => "RestoreBatch",
        }
    }

    /// True for the variants that produce BackupSessions
    pub fn is_backup(&self) -> bool {
        matches!(self, Self::BackupConfiguration | Self::BackupBatch)
    }
}

impl fmt::Display for InvokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvokerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BackupConfiguration" => Ok(Self::BackupConfiguration),
            "BackupBatch" => Ok(Self::BackupBatch),
            "RestoreSession" => Ok(Self::RestoreSession),
            "RestoreBatch" => Ok(Self::RestoreBatch),
            other => Err(Error::unknown_kind(other)),
        }
    }
}

/// One backup target in canonical form
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackupTargetInfo {
    /// Task to run for this target
    pub task: TaskRef,
    /// Target; a cluster-wide backup carries the empty reference
    pub target: BackupTarget,
    /// Executor runtime settings
    pub runtime_settings: RuntimeSettings,
    /// Scratch volume settings
    pub temp_dir: EmptyDirSettings,
    /// Volume used to stage data before upload
    pub interim_volume_template: Option<PersistentVolumeClaimTemplate>,
    /// Per-target hooks
    pub hooks: Option<BackupHooks>,
}

impl BackupTargetInfo {
    /// The target reference, never absent
    pub fn target_ref(&self) -> &TargetRef {
        &self.target.ref_
    }

    /// Volume mounts declared on the target
    pub fn volume_mounts(&self) -> &[VolumeMount] {
        &self.target.volume_mounts
    }
}

/// One restore target in canonical form
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RestoreTargetInfo {
    /// Task to run for this target
    pub task: TaskRef,
    /// Target, `None` for a cluster-wide restore
    pub target: Option<RestoreTarget>,
    /// Executor runtime settings
    pub runtime_settings: RuntimeSettings,
    /// Scratch volume settings
    pub temp_dir: EmptyDirSettings,
    /// Volume used to stage data after download
    pub interim_volume_template: Option<PersistentVolumeClaimTemplate>,
    /// Per-target hooks
    pub hooks: Option<RestoreHooks>,
}

impl RestoreTargetInfo {
    /// The target reference; the empty reference for a cluster-wide restore
    pub fn target_ref(&self) -> TargetRef {
        self.target
            .as_ref()
            .map(|t| t.ref_.clone())
            .unwrap_or_else(TargetRef::empty)
    }
}

pub(crate) fn backup_target_info(
    template: &stash_common::crd::BackupConfigurationTemplateSpec,
    namespace: &str,
) -> BackupTargetInfo {
    let mut target = template.target.clone().unwrap_or_default();
    if !target.ref_.is_empty() {
        target.ref_ = with_default_namespace(target.ref_, namespace);
    }
    BackupTargetInfo {
        task: template.task.clone(),
        target,
        runtime_settings: template.runtime_settings.clone(),
        temp_dir: template.temp_dir.clone(),
        interim_volume_template: template.interim_volume_template.clone(),
        hooks: template.hooks.clone(),
    }
}

pub(crate) fn restore_target_info(
    template: &stash_common::crd::RestoreTargetSpec,
    namespace: &str,
) -> RestoreTargetInfo {
    let target = template.target.clone().map(|mut t| {
        t.ref_ = with_default_namespace(t.ref_, namespace);
        t
    });
    RestoreTargetInfo {
        task: template.task.clone(),
        target,
        runtime_settings: template.runtime_settings.clone(),
        temp_dir: template.temp_dir.clone(),
        interim_volume_template: template.interim_volume_template.clone(),
        hooks: template.hooks.clone(),
    }
}

/// Controller owner reference pointing at an invoker
pub(crate) fn owner_reference(kind: InvokerKind, meta: &ObjectMeta) -> Result<OwnerReference> {
    let name = meta.name.clone().unwrap_or_default();
    let uid = meta.uid.clone().ok_or_else(|| {
        Error::validation_for_field(kind.as_str(), "metadata.uid", format!("{} has no uid", name))
    })?;
    Ok(OwnerReference {
        api_version: STASH_API_VERSION.to_string(),
        kind: kind.as_str().to_string(),
        name,
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Behavior shared by every invoker variant
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Which variant this is
    fn kind(&self) -> InvokerKind;

    /// Metadata of the snapshot taken at extraction
    fn meta(&self) -> &ObjectMeta;

    /// Invoker name
    fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    /// Invoker namespace
    fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    /// Labels of the invoker
    fn labels(&self) -> BTreeMap<String, String> {
        self.meta().labels.clone().unwrap_or_default()
    }

    /// Controller owner reference for objects created on behalf of this invoker
    fn owner_ref(&self) -> Result<OwnerReference> {
        owner_reference(self.kind(), self.meta())
    }

    /// Deterministic hash of the spec, independent of metadata and status
    fn hash(&self) -> Result<String>;

    /// Canonical JSON of the invoker for drift-detection annotations
    fn object_json(&self) -> Result<String>;

    /// Backup/restore driver
    fn driver(&self) -> Snapshotter;

    /// Repository reference, namespace defaulted to the invoker's
    fn repository(&self) -> Option<ObjectReference>;

    /// Order in which targets run
    fn execution_order(&self) -> ExecutionOrder;

    /// Raw `timeOut` value
    fn time_out(&self) -> Option<&str>;

    /// Declared target references in order
    fn target_refs(&self) -> Vec<TargetRef>;

    /// Add the stash finalizer; a no-op when present
    async fn add_finalizer(&self) -> Result<()>;

    /// Remove the stash finalizer; a no-op when absent
    async fn remove_finalizer(&self) -> Result<()>;

    /// Read the ledger for `target`, or the invoker-level ledger when `None`
    async fn conditions(&self, target: Option<&TargetRef>) -> Result<Vec<Condition>>;

    /// Upsert a condition, retrying on write conflicts
    async fn set_condition(&self, target: Option<&TargetRef>, condition: Condition) -> Result<()>;

    /// Whether the ledger holds a condition of this type
    async fn has_condition(&self, target: Option<&TargetRef>, condition_type: &str) -> Result<bool> {
        let conditions = self.conditions(target).await?;
        Ok(has_condition(&conditions, condition_type))
    }

    /// Fetch a condition by type
    async fn get_condition(
        &self,
        target: Option<&TargetRef>,
        condition_type: &str,
    ) -> Result<Option<Condition>> {
        let conditions = self.conditions(target).await?;
        Ok(get_condition(&conditions, condition_type).map(|(_, c)| c.clone()))
    }

    /// Whether the condition is present with status `True`
    async fn is_condition_true(
        &self,
        target: Option<&TargetRef>,
        condition_type: &str,
    ) -> Result<bool> {
        let conditions = self.conditions(target).await?;
        Ok(is_condition_true(&conditions, condition_type))
    }
}

/// Invokers that create BackupSessions on a schedule
#[async_trait]
pub trait BackupInvoker: Invoker {
    /// Cron schedule
    fn schedule(&self) -> &str;

    /// Retention policy applied after each successful session
    fn retention_policy(&self) -> &RetentionPolicy;

    /// Whether scheduling is paused
    fn is_paused(&self) -> bool;

    /// Number of finished sessions to keep
    fn backup_history_limit(&self) -> Option<i32>;

    /// Hooks run once around the whole session
    fn global_hooks(&self) -> Option<&BackupHooks>;

    /// Invoker-wide runtime settings
    fn runtime_settings(&self) -> &RuntimeSettings;

    /// Session retry settings
    fn retry_config(&self) -> Option<&SessionRetryConfig>;

    /// Targets in declared order
    fn target_infos(&self) -> Vec<BackupTargetInfo>;

    /// Stamp `status.observedGeneration` with the current generation
    async fn update_observed_generation(&self) -> Result<()>;

    /// Deadline for a session started at `now`, if the invoker sets a timeout
    fn session_deadline(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        session_deadline(self.time_out(), now)
    }

    /// Build the BackupSession for a scheduling tick at `now`
    fn new_session(&self, now: DateTime<Utc>) -> Result<BackupSession> {
        let mut labels = self.labels();
        labels.insert(LABEL_INVOKER_TYPE.to_string(), self.kind().to_string());
        labels.insert(LABEL_INVOKER_NAME.to_string(), self.name().to_string());
        if let Some(first) = self.target_infos().first() {
            let target = first.target_ref();
            if !target.is_empty() {
                labels.insert(LABEL_TARGET_KIND.to_string(), target.kind.clone());
                labels.insert(LABEL_TARGET_NAME.to_string(), target.name.clone());
                labels.insert(LABEL_TARGET_NAMESPACE.to_string(), target.namespace.clone());
            }
        }

        let spec = BackupSessionSpec {
            invoker: BackupInvokerRef {
                api_group: STASH_API_GROUP.to_string(),
                kind: self.kind().to_string(),
                name: self.name().to_string(),
            },
            retry_left: self.retry_config().map(|r| r.max_retry).unwrap_or(0),
        };
        let mut session = BackupSession::new(
            &format!("{}-{}", self.name(), now.timestamp()),
            spec,
        );
        session.metadata.namespace = Some(self.namespace().to_string());
        session.metadata.labels = Some(labels);
        session.metadata.owner_references = Some(vec![self.owner_ref()?]);
        Ok(session)
    }
}

/// Invokers that are also their own session
#[async_trait]
pub trait RestoreInvoker: Invoker {
    /// Targets in declared order
    fn target_infos(&self) -> Vec<RestoreTargetInfo>;

    /// Hooks run once around the whole restore
    fn global_hooks(&self) -> Option<&RestoreHooks>;

    /// Observed member statuses, read fresh from the store
    async fn members(&self) -> Result<Vec<RestoreMemberStatus>>;

    /// Merge a partial status and return the resulting phase
    async fn update_status(&self, update: &RestoreStatusUpdate) -> Result<RestorePhase>;

    /// Deadline for a restore started at `now`, if the invoker sets a timeout
    fn session_deadline(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        session_deadline(self.time_out(), now)
    }

    /// Whether `candidate` may start given the observed member statuses
    async fn next_in_order(&self, candidate: &TargetRef) -> Result<bool> {
        let members = self.members().await?;
        Ok(is_eligible(
            self.execution_order(),
            &self.target_refs(),
            candidate,
            &members,
        ))
    }
}

fn session_deadline(time_out: Option<&str>, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = time_out.filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    let timeout = parse_duration(raw)?;
    let timeout = ChronoDuration::from_std(timeout)
        .map_err(|e| Error::validation_for_field("invoker", "spec.timeOut", e.to_string()))?;
    Ok(Some(now + timeout))
}

pub(crate) fn default_repository(
    repository: Option<&ObjectReference>,
    namespace: &str,
) -> Option<ObjectReference> {
    repository.map(|r| ObjectReference {
        name: r.name.clone(),
        namespace: Some(
            r.namespace
                .clone()
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| namespace.to_string()),
        ),
    })
}

/// Stores for every invoker variant, plus the config threaded into writers
#[derive(Clone)]
pub struct InvokerStores {
    /// BackupConfiguration store
    pub backup_configurations: Arc<dyn ResourceStore<BackupConfiguration>>,
    /// BackupBatch store
    pub backup_batches: Arc<dyn ResourceStore<BackupBatch>>,
    /// RestoreSession store
    pub restore_sessions: Arc<dyn ResourceStore<RestoreSession>>,
    /// RestoreBatch store
    pub restore_batches: Arc<dyn ResourceStore<RestoreBatch>>,
    /// Write and retry settings
    pub config: StatusStoreConfig,
}

impl InvokerStores {
    /// Stores backed by the Kubernetes API server
    pub fn from_client(client: Client, config: StatusStoreConfig) -> Self {
        Self {
            backup_configurations: Arc::new(KubeStore::new(client.clone(), &config)),
            backup_batches: Arc::new(KubeStore::new(client.clone(), &config)),
            restore_sessions: Arc::new(KubeStore::new(client.clone(), &config)),
            restore_batches: Arc::new(KubeStore::new(client, &config)),
            config,
        }
    }
}

/// Fetch a backup invoker by kind and wrap it in its adapter.
///
/// Fails with `UnknownKind` when `kind` is not a backup invoker kind and with
/// `NotFound` when the object does not exist.
pub async fn extract_backup_invoker(
    stores: &InvokerStores,
    kind: &str,
    name: &str,
    namespace: &str,
) -> Result<Box<dyn BackupInvoker>> {
    match kind.parse::<InvokerKind>()? {
        InvokerKind::BackupConfiguration => {
            let obj = stores.backup_configurations.get(namespace, name).await?;
            Ok(Box::new(BackupConfigurationInvoker::new(
                obj,
                stores.backup_configurations.clone(),
                stores.config.clone(),
            )))
        }
        InvokerKind::BackupBatch => {
            let obj = stores.backup_batches.get(namespace, name).await?;
            Ok(Box::new(BackupBatchInvoker::new(
                obj,
                stores.backup_batches.clone(),
                stores.config.clone(),
            )))
        }
        other => Err(Error::unknown_kind(format!(
            "{} is not a backup invoker",
            other
        ))),
    }
}

/// Fetch a restore invoker by kind and wrap it in its adapter.
pub async fn extract_restore_invoker(
    stores: &InvokerStores,
    kind: &str,
    name: &str,
    namespace: &str,
) -> Result<Box<dyn RestoreInvoker>> {
    match kind.parse::<InvokerKind>()? {
        InvokerKind::RestoreSession => {
            let obj = stores.restore_sessions.get(namespace, name).await?;
            Ok(Box::new(RestoreSessionInvoker::new(
                obj,
                stores.restore_sessions.clone(),
                stores.config.clone(),
            )))
        }
        InvokerKind::RestoreBatch => {
            let obj = stores.restore_batches.get(namespace, name).await?;
            Ok(Box::new(RestoreBatchInvoker::new(
                obj,
                stores.restore_batches.clone(),
                stores.config.clone(),
            )))
        }
        other => Err(Error::unknown_kind(format!(
            "{} is not a restore invoker",
            other
        ))),
    }
}
