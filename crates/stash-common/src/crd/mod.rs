//! Custom Resource Definitions for Stash
//!
//! Invokers (BackupConfiguration, BackupBatch, RestoreSession, RestoreBatch)
//! declare intent; BackupSession records one execution of a backup invoker.
//! RestoreSession and RestoreBatch are both invoker and session.

mod backup_batch;
mod backup_configuration;
mod backup_session;
mod restore_batch;
mod restore_session;
mod types;

pub use backup_batch::{BackupBatch, BackupBatchSpec, BackupBatchStatus};
pub use backup_configuration::{
    BackupConfiguration, BackupConfigurationSpec, BackupConfigurationStatus,
    BackupConfigurationTemplateSpec, BackupInvokerPhase,
};
pub use backup_session::{
    BackupInvokerRef, BackupSession, BackupSessionPhase, BackupSessionSpec, BackupSessionStatus,
    BackupTargetPhase, BackupTargetStatus, FileStats, HostBackupPhase, HostBackupStats,
    SnapshotStats,
};
pub use restore_batch::{
    RestoreBatch, RestoreBatchSpec, RestoreBatchStatus, RestoreMemberStatus, RestoreTargetPhase,
};
pub use restore_session::{
    HostRestorePhase, HostRestoreStats, RestorePhase, RestoreSession, RestoreSessionSpec,
    RestoreSessionStatus, RestoreTargetSpec,
};
pub use types::{
    BackupHooks, BackupTarget, Condition, ConditionStatus, ContainerRuntimeSettings,
    EmptyDirSettings, ExecutionOrder, HookHandler, IoNiceSettings, NiceSettings, ObjectReference,
    Param, PersistentVolumeClaimTemplate, PodRuntimeSettings, RestoreHooks, RestoreTarget,
    RetentionPolicy, Rule, RuntimeSettings, SessionRetryConfig, Snapshotter, TargetRef, TaskRef,
};
