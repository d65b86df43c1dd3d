//! Adapter for the multi-target BackupBatch
//!
//! Invoker-level conditions live in `status.conditions`; conditions about a
//! single member live in `status.memberConditions`, keyed by target.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info};

use stash_common::conditions::{member_conditions, set_condition, set_member_condition};
use stash_common::crd::{
    BackupBatch, BackupBatchStatus, BackupHooks, Condition, ExecutionOrder, ObjectReference,
    RetentionPolicy, RuntimeSettings, SessionRetryConfig, Snapshotter, TargetRef,
};
use stash_common::kube_utils::{self, object_json, spec_hash};
use stash_common::{Result, STASH_FINALIZER};

use super::{backup_target_info, default_repository, BackupInvoker, BackupTargetInfo, Invoker, InvokerKind};
use crate::phase::calculate_backup_invoker_phase;
use crate::store::{update_status_with_retry, update_with_retry, ResourceStore, StatusStoreConfig};

/// [`BackupInvoker`] over a BackupBatch
pub struct BackupBatchInvoker {
    obj: BackupBatch,
    store: Arc<dyn ResourceStore<BackupBatch>>,
    config: StatusStoreConfig,
}

impl BackupBatchInvoker {
    /// Wrap a fetched BackupBatch
    pub fn new(
        obj: BackupBatch,
        store: Arc<dyn ResourceStore<BackupBatch>>,
        config: StatusStoreConfig,
    ) -> Self {
        Self { obj, store, config }
    }
}

fn record_condition(obj: &mut BackupBatch, target: Option<&TargetRef>, condition: Condition) {
    let driver = obj.spec.driver;
    let status = obj.status.get_or_insert_with(BackupBatchStatus::default);
    match target {
        Some(target) => set_member_condition(&mut status.member_conditions, target, condition),
        None => {
            set_condition(&mut status.conditions, condition);
            status.phase = calculate_backup_invoker_phase(&status.conditions, driver);
        }
    }
}

#[async_trait]
impl Invoker for BackupBatchInvoker {
    fn kind(&self) -> InvokerKind {
        InvokerKind::BackupBatch
    }

    fn meta(&self) -> &ObjectMeta {
        &self.obj.metadata
    }

    fn hash(&self) -> Result<String> {
        spec_hash(&self.obj.spec)
    }

    fn object_json(&self) -> Result<String> {
        object_json(&self.obj)
    }

    fn driver(&self) -> Snapshotter {
        self.obj.spec.driver
    }

    fn repository(&self) -> Option<ObjectReference> {
        default_repository(self.obj.spec.repository.as_ref(), self.namespace())
    }

    fn execution_order(&self) -> ExecutionOrder {
        self.obj.spec.execution_order
    }

    fn time_out(&self) -> Option<&str> {
        self.obj.spec.time_out.as_deref()
    }

    fn target_refs(&self) -> Vec<TargetRef> {
        self.target_infos()
            .iter()
            .map(|t| t.target_ref().clone())
            .collect()
    }

    async fn add_finalizer(&self) -> Result<()> {
        update_with_retry(
            self.store.as_ref(),
            &self.config,
            self.namespace(),
            self.name(),
            |mut obj: BackupBatch| {
                kube_utils::add_finalizer(&mut obj.metadata, STASH_FINALIZER);
                (obj, true)
            },
        )
        .await?;
        Ok(())
    }

    async fn remove_finalizer(&self) -> Result<()> {
        update_with_retry(
            self.store.as_ref(),
            &self.config,
            self.namespace(),
            self.name(),
            |mut obj: BackupBatch| {
                kube_utils::remove_finalizer(&mut obj.metadata, STASH_FINALIZER);
                (obj, true)
            },
        )
        .await?;
        Ok(())
    }

    async fn conditions(&self, target: Option<&TargetRef>) -> Result<Vec<Condition>> {
        let status = self
            .store
            .get(self.namespace(), self.name())
            .await?
            .status
            .unwrap_or_default();
        Ok(match target {
            Some(target) => member_conditions(&status.member_conditions, target)
                .map(<[Condition]>::to_vec)
                .unwrap_or_default(),
            None => status.conditions,
        })
    }

    async fn set_condition(&self, target: Option<&TargetRef>, condition: Condition) -> Result<()> {
        let condition_type = condition.type_.clone();
        update_status_with_retry(
            self.store.as_ref(),
            &self.config,
            self.namespace(),
            self.name(),
            |mut obj: BackupBatch| {
                record_condition(&mut obj, target, condition.clone());
                (obj, true)
            },
        )
        .await?;
        debug!(
            invoker = %self.name(),
            target = ?target.map(ToString::to_string),
            condition = %condition_type,
            "condition recorded"
        );
        Ok(())
    }
}

#[async_trait]
impl BackupInvoker for BackupBatchInvoker {
    fn schedule(&self) -> &str {
        &self.obj.spec.schedule
    }

    fn retention_policy(&self) -> &RetentionPolicy {
        &self.obj.spec.retention_policy
    }

    fn is_paused(&self) -> bool {
        self.obj.spec.paused
    }

    fn backup_history_limit(&self) -> Option<i32> {
        self.obj.spec.backup_history_limit
    }

    fn global_hooks(&self) -> Option<&BackupHooks> {
        self.obj.spec.hooks.as_ref()
    }

    fn runtime_settings(&self) -> &RuntimeSettings {
        &self.obj.spec.runtime_settings
    }

    fn retry_config(&self) -> Option<&SessionRetryConfig> {
        self.obj.spec.retry_config.as_ref()
    }

    fn target_infos(&self) -> Vec<BackupTargetInfo> {
        self.obj
            .spec
            .members
            .iter()
            .map(|member| backup_target_info(member, self.namespace()))
            .collect()
    }

    async fn update_observed_generation(&self) -> Result<()> {
        update_status_with_retry(
            self.store.as_ref(),
            &self.config,
            self.namespace(),
            self.name(),
            |mut obj: BackupBatch| {
                let generation = obj.metadata.generation;
                obj.status
                    .get_or_insert_with(BackupBatchStatus::default)
                    .observed_generation = generation;
                (obj, true)
            },
        )
        .await?;
        info!(invoker = %self.name(), "observed generation updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use stash_common::conditions::{
        BACKEND_SECRET_FOUND, BACKUP_TARGET_FOUND, CRON_JOB_CREATED, REPOSITORY_FOUND,
        STASH_SIDECAR_INJECTED, VALIDATION_PASSED,
    };
    use stash_common::crd::{
        BackupBatchSpec, BackupConfigurationTemplateSpec, BackupInvokerPhase, BackupTarget,
        HookHandler,
    };

    use crate::store::memory::MemoryStore;

    fn member(kind: &str, name: &str, namespace: &str) -> BackupConfigurationTemplateSpec {
        BackupConfigurationTemplateSpec {
            target: Some(BackupTarget {
                ref_: TargetRef::new("apps/v1", kind, name, namespace),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn setup() -> (Arc<MemoryStore<BackupBatch>>, BackupBatchInvoker) {
        let spec = BackupBatchSpec {
            driver: Snapshotter::Restic,
            repository: None,
            members: vec![
                member("Deployment", "wordpress", ""),
                member("StatefulSet", "mysql", "db"),
                BackupConfigurationTemplateSpec::default(),
            ],
            schedule: "0 */2 * * *".to_string(),
            runtime_settings: RuntimeSettings::default(),
            retention_policy: RetentionPolicy::default(),
            paused: true,
            backup_history_limit: None,
            hooks: Some(BackupHooks {
                pre_backup: Some(HookHandler::default()),
                post_backup: None,
            }),
            execution_order: ExecutionOrder::Sequential,
            time_out: None,
            retry_config: None,
        };
        let obj = BackupBatch {
            metadata: meta("wordpress-batch"),
            spec,
            status: None,
        };
        let store = Arc::new(MemoryStore::new());
        store.insert(obj.clone());
        let invoker = BackupBatchInvoker::new(obj, store.clone(), fast_config());
        (store, invoker)
    }

    #[test]
    fn test_target_list_defaults_namespace_and_keeps_order() {
        let (_, invoker) = setup();
        assert_eq!(
            invoker.target_refs(),
            vec![
                TargetRef::new("apps/v1", "Deployment", "wordpress", "demo"),
                TargetRef::new("apps/v1", "StatefulSet", "mysql", "db"),
                TargetRef::empty(),
            ]
        );
        assert_eq!(invoker.execution_order(), ExecutionOrder::Sequential);
        assert!(invoker.is_paused());
        assert!(invoker.global_hooks().unwrap().pre_backup.is_some());
    }

    #[test]
    fn test_new_session_uses_first_target_labels() {
        let (_, invoker) = setup();
        let session = invoker.new_session(chrono::Utc::now()).unwrap();
        let labels = session.metadata.labels.unwrap();
        assert_eq!(labels[stash_common::LABEL_TARGET_NAME], "wordpress");
        assert_eq!(session.spec.retry_left, 0);
        assert_eq!(session.spec.invoker.kind, "BackupBatch");
    }

    /// Story: member conditions and invoker conditions land in separate ledgers
    #[tokio::test]
    async fn story_member_and_invoker_ledgers() {
        let (store, invoker) = setup();
        let wordpress = TargetRef::new("apps/v1", "Deployment", "wordpress", "demo");
        let mysql = TargetRef::new("apps/v1", "StatefulSet", "mysql", "db");

        invoker
            .set_condition(Some(&wordpress), Condition::truthy(BACKUP_TARGET_FOUND, "TargetAvailable"))
            .await
            .unwrap();
        invoker
            .set_condition(Some(&wordpress), Condition::truthy(STASH_SIDECAR_INJECTED, "SidecarInjected"))
            .await
            .unwrap();
        invoker
            .set_condition(
                Some(&mysql),
                Condition::falsy(BACKUP_TARGET_FOUND, "TargetNotFound", "statefulset db/mysql not found"),
            )
            .await
            .unwrap();

        let status = store.current("demo", "wordpress-batch").status.unwrap();
        assert!(status.conditions.is_empty());
        assert_eq!(status.member_conditions.len(), 2);
        assert_eq!(status.member_conditions[0].conditions.len(), 2);

        assert!(invoker
            .is_condition_true(Some(&wordpress), STASH_SIDECAR_INJECTED)
            .await
            .unwrap());
        assert!(!invoker
            .is_condition_true(Some(&mysql), BACKUP_TARGET_FOUND)
            .await
            .unwrap());
        assert!(!invoker
            .has_condition(None, BACKUP_TARGET_FOUND)
            .await
            .unwrap());

        for c in [REPOSITORY_FOUND, BACKEND_SECRET_FOUND, VALIDATION_PASSED, CRON_JOB_CREATED] {
            invoker
                .set_condition(None, Condition::truthy(c, "Ok"))
                .await
                .unwrap();
        }
        let status = store.current("demo", "wordpress-batch").status.unwrap();
        assert_eq!(status.phase, BackupInvokerPhase::Ready);
        assert_eq!(status.conditions.len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_member_ledger_is_empty() {
        let (_, invoker) = setup();
        let other = TargetRef::new("apps/v1", "DaemonSet", "agent", "demo");
        assert!(invoker.conditions(Some(&other)).await.unwrap().is_empty());
        assert!(invoker
            .get_condition(Some(&other), BACKUP_TARGET_FOUND)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_observed_generation() {
        let (store, invoker) = setup();
        invoker.update_observed_generation().await.unwrap();
        assert_eq!(
            store
                .current("demo", "wordpress-batch")
                .status
                .unwrap()
                .observed_generation,
            Some(3)
        );
    }
}
