//! Adapter for the single-target BackupConfiguration

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info};

use stash_common::conditions::set_condition;
use stash_common::crd::{
    BackupConfiguration, BackupConfigurationStatus, BackupHooks, Condition, ExecutionOrder,
    ObjectReference, RetentionPolicy, RuntimeSettings, SessionRetryConfig, Snapshotter, TargetRef,
};
use stash_common::kube_utils::{self, object_json, spec_hash};
use stash_common::{Result, STASH_FINALIZER};

use super::{backup_target_info, default_repository, BackupInvoker, BackupTargetInfo, Invoker, InvokerKind};
use crate::phase::calculate_backup_invoker_phase;
use crate::store::{update_status_with_retry, update_with_retry, ResourceStore, StatusStoreConfig};

/// [`BackupInvoker`] over a BackupConfiguration
pub struct BackupConfigurationInvoker {
    obj: BackupConfiguration,
    store: Arc<dyn ResourceStore<BackupConfiguration>>,
    config: StatusStoreConfig,
}

impl BackupConfigurationInvoker {
    /// Wrap a fetched BackupConfiguration
    pub fn new(
        obj: BackupConfiguration,
        store: Arc<dyn ResourceStore<BackupConfiguration>>,
        config: StatusStoreConfig,
    ) -> Self {
        Self { obj, store, config }
    }

    async fn fresh(&self) -> Result<BackupConfiguration> {
        self.store.get(self.namespace(), self.name()).await
    }
}

#[async_trait]
impl Invoker for BackupConfigurationInvoker {
    fn kind(&self) -> InvokerKind {
        InvokerKind::BackupConfiguration
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
        ExecutionOrder::Parallel
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
            |mut obj: BackupConfiguration| {
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
            |mut obj: BackupConfiguration| {
                kube_utils::remove_finalizer(&mut obj.metadata, STASH_FINALIZER);
                (obj, true)
            },
        )
        .await?;
        Ok(())
    }

    /// A BackupConfiguration has one ledger; `target` is ignored.
    async fn conditions(&self, _target: Option<&TargetRef>) -> Result<Vec<Condition>> {
        let obj = self.fresh().await?;
        Ok(obj.status.map(|s| s.conditions).unwrap_or_default())
    }

    async fn set_condition(&self, _target: Option<&TargetRef>, condition: Condition) -> Result<()> {
        let condition_type = condition.type_.clone();
        let updated = update_status_with_retry(
            self.store.as_ref(),
            &self.config,
            self.namespace(),
            self.name(),
            |mut obj: BackupConfiguration| {
                let driver = obj.spec.driver;
                let status = obj
                    .status
                    .get_or_insert_with(BackupConfigurationStatus::default);
                set_condition(&mut status.conditions, condition.clone());
                status.phase = calculate_backup_invoker_phase(&status.conditions, driver);
                (obj, true)
            },
        )
        .await?;

        let phase = updated.status.map(|s| s.phase).unwrap_or_default();
        debug!(
            invoker = %self.name(),
            condition = %condition_type,
            phase = %phase,
            "condition recorded"
        );
        Ok(())
    }
}

#[async_trait]
impl BackupInvoker for BackupConfigurationInvoker {
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
        None
    }

    fn runtime_settings(&self) -> &RuntimeSettings {
        &self.obj.spec.template.runtime_settings
    }

    fn retry_config(&self) -> Option<&SessionRetryConfig> {
        self.obj.spec.retry_config.as_ref()
    }

    fn target_infos(&self) -> Vec<BackupTargetInfo> {
        vec![backup_target_info(&self.obj.spec.template, self.namespace())]
    }

    async fn update_observed_generation(&self) -> Result<()> {
        let updated = update_status_with_retry(
            self.store.as_ref(),
            &self.config,
            self.namespace(),
            self.name(),
            |mut obj: BackupConfiguration| {
                let generation = obj.metadata.generation;
                obj.status
                    .get_or_insert_with(BackupConfigurationStatus::default)
                    .observed_generation = generation;
                (obj, true)
            },
        )
        .await?;
        info!(
            invoker = %self.name(),
            generation = ?updated.metadata.generation,
            "observed generation updated"
        );
        Ok(())
    }
}
