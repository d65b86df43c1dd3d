//! Adapter for the multi-target RestoreBatch

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info};

use stash_common::crd::{
    Condition, ExecutionOrder, ObjectReference, RestoreBatch, RestoreHooks, RestoreMemberStatus,
    RestorePhase, Snapshotter, TargetRef,
};
use stash_common::kube_utils::{self, object_json, spec_hash};
use stash_common::target::find_by_target;
use stash_common::{Result, STASH_FINALIZER};

use super::restore_session::created_at;
use super::{default_repository, restore_target_info, Invoker, InvokerKind, RestoreInvoker, RestoreTargetInfo};
use crate::merge::{merge_restore_batch_status, RestoreStatusUpdate};
use crate::store::{update_status_with_retry, update_with_retry, ResourceStore, StatusStoreConfig};

/// [`RestoreInvoker`] over a RestoreBatch
pub struct RestoreBatchInvoker {
    obj: RestoreBatch,
    store: Arc<dyn ResourceStore<RestoreBatch>>,
    config: StatusStoreConfig,
}

impl RestoreBatchInvoker {
    /// Wrap a fetched RestoreBatch
    pub fn new(
        obj: RestoreBatch,
        store: Arc<dyn ResourceStore<RestoreBatch>>,
        config: StatusStoreConfig,
    ) -> Self {
        Self { obj, store, config }
    }

    async fn merge(&self, update: &RestoreStatusUpdate) -> Result<RestoreBatch> {
        let now = Utc::now();
        update_status_with_retry(
            self.store.as_ref(),
            &self.config,
            self.namespace(),
            self.name(),
            |mut obj: RestoreBatch| {
                let created = created_at(&obj.metadata, now);
                let total_targets = obj.spec.members.len();
                let current = obj.status.take().unwrap_or_default();
                obj.status = Some(merge_restore_batch_status(
                    &current,
                    update,
                    total_targets,
                    created,
                    now,
                ));
                (obj, true)
            },
        )
        .await
    }
}

#[async_trait]
impl Invoker for RestoreBatchInvoker {
    fn kind(&self) -> InvokerKind {
        InvokerKind::RestoreBatch
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
        self.target_infos().iter().map(|t| t.target_ref()).collect()
    }

    async fn add_finalizer(&self) -> Result<()> {
        update_with_retry(
            self.store.as_ref(),
            &self.config,
            self.namespace(),
            self.name(),
            |mut obj: RestoreBatch| {
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
            |mut obj: RestoreBatch| {
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
            Some(target) => find_by_target(&status.members, target)
                .map(|m| m.conditions.clone())
                .unwrap_or_default(),
            None => status.conditions,
        })
    }

    async fn set_condition(&self, target: Option<&TargetRef>, condition: Condition) -> Result<()> {
        let condition_type = condition.type_.clone();
        let update = match target {
            Some(target) => RestoreStatusUpdate {
                members: vec![RestoreMemberStatus {
                    ref_: target.clone(),
                    conditions: vec![condition],
                    ..Default::default()
                }],
                ..Default::default()
            },
            None => RestoreStatusUpdate {
                conditions: vec![condition],
                ..Default::default()
            },
        };
        self.merge(&update).await?;
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
impl RestoreInvoker for RestoreBatchInvoker {
    fn target_infos(&self) -> Vec<RestoreTargetInfo> {
        self.obj
            .spec
            .members
            .iter()
            .map(|member| restore_target_info(member, self.namespace()))
            .collect()
    }

    fn global_hooks(&self) -> Option<&RestoreHooks> {
        self.obj.spec.hooks.as_ref()
    }

    async fn members(&self) -> Result<Vec<RestoreMemberStatus>> {
        let obj = self.store.get(self.namespace(), self.name()).await?;
        Ok(obj.status.map(|s| s.members).unwrap_or_default())
    }

    async fn update_status(&self, update: &RestoreStatusUpdate) -> Result<RestorePhase> {
        let updated = self.merge(update).await?;
        let status = updated.status.unwrap_or_default();
        info!(
            invoker = %self.name(),
            phase = %status.phase,
            members = status.members.len(),
            "restore status merged"
        );
        Ok(status.phase)
    }
}
