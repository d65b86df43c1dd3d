//! Adapter for the single-target RestoreSession
//!
//! A RestoreSession is invoker and session at once. Its status has a single
//! ledger; conditions about the target and about the session share it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info};

use stash_common::crd::{
    Condition, ExecutionOrder, ObjectReference, RestoreHooks, RestoreMemberStatus, RestorePhase,
    RestoreSession, RestoreSessionStatus, Snapshotter, TargetRef,
};
use stash_common::kube_utils::{self, object_json, spec_hash};
use stash_common::{Result, STASH_FINALIZER};

use super::{default_repository, restore_target_info, Invoker, InvokerKind, RestoreInvoker, RestoreTargetInfo};
use crate::merge::{merge_restore_session_status, restore_session_member, RestoreStatusUpdate};
use crate::store::{update_status_with_retry, update_with_retry, ResourceStore, StatusStoreConfig};

/// [`RestoreInvoker`] over a RestoreSession
pub struct RestoreSessionInvoker {
    obj: RestoreSession,
    store: Arc<dyn ResourceStore<RestoreSession>>,
    config: StatusStoreConfig,
}

impl RestoreSessionInvoker {
    /// Wrap a fetched RestoreSession
    pub fn new(
        obj: RestoreSession,
        store: Arc<dyn ResourceStore<RestoreSession>>,
        config: StatusStoreConfig,
    ) -> Self {
        Self { obj, store, config }
    }

    fn target(&self) -> TargetRef {
        restore_target_info(&self.obj.spec.template, self.namespace()).target_ref()
    }

    async fn merge(&self, update: &RestoreStatusUpdate) -> Result<RestoreSession> {
        let target = self.target();
        let now = Utc::now();
        update_status_with_retry(
            self.store.as_ref(),
            &self.config,
            self.namespace(),
            self.name(),
            |mut obj: RestoreSession| {
                let created = created_at(&obj.metadata, now);
                let current = obj.status.take().unwrap_or_default();
                obj.status = Some(merge_restore_session_status(
                    &current, &target, update, created, now,
                ));
                (obj, true)
            },
        )
        .await
    }
}

pub(super) fn created_at(meta: &ObjectMeta, fallback: DateTime<Utc>) -> DateTime<Utc> {
    meta.creation_timestamp
        .as_ref()
        .map(|t| t.0)
        .unwrap_or(fallback)
}

#[async_trait]
impl Invoker for RestoreSessionInvoker {
    fn kind(&self) -> InvokerKind {
        InvokerKind::RestoreSession
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
        vec![self.target()]
    }

    async fn add_finalizer(&self) -> Result<()> {
        update_with_retry(
            self.store.as_ref(),
            &self.config,
            self.namespace(),
            self.name(),
            |mut obj: RestoreSession| {
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
            |mut obj: RestoreSession| {
                kube_utils::remove_finalizer(&mut obj.metadata, STASH_FINALIZER);
                (obj, true)
            },
        )
        .await?;
        Ok(())
    }

    async fn conditions(&self, _target: Option<&TargetRef>) -> Result<Vec<Condition>> {
        let obj = self.store.get(self.namespace(), self.name()).await?;
        Ok(obj.status.map(|s| s.conditions).unwrap_or_default())
    }

    async fn set_condition(&self, _target: Option<&TargetRef>, condition: Condition) -> Result<()> {
        let condition_type = condition.type_.clone();
        let update = RestoreStatusUpdate {
            conditions: vec![condition],
            ..Default::default()
        };
        let updated = self.merge(&update).await?;
        debug!(
            invoker = %self.name(),
            condition = %condition_type,
            phase = %updated.status.map(|s| s.phase).unwrap_or_default(),
            "condition recorded"
        );
        Ok(())
    }
}

#[async_trait]
impl RestoreInvoker for RestoreSessionInvoker {
    fn target_infos(&self) -> Vec<RestoreTargetInfo> {
        vec![restore_target_info(&self.obj.spec.template, self.namespace())]
    }

    fn global_hooks(&self) -> Option<&RestoreHooks> {
        None
    }

    async fn members(&self) -> Result<Vec<RestoreMemberStatus>> {
        let obj = self.store.get(self.namespace(), self.name()).await?;
        let status = obj.status.unwrap_or_default();
        Ok(vec![restore_session_member(&status, &self.target())])
    }

    async fn update_status(&self, update: &RestoreStatusUpdate) -> Result<RestorePhase> {
        let updated = self.merge(update).await?;
        let status: RestoreSessionStatus = updated.status.unwrap_or_default();
        info!(
            invoker = %self.name(),
            phase = %status.phase,
            hosts = status.stats.len(),
            "restore status merged"
        );
        Ok(status.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use stash_common::conditions::{
        METRICS_PUSHED, REPOSITORY_FOUND, RESTORE_EXECUTOR_ENSURED, VALIDATION_PASSED,
    };
    use stash_common::crd::{
        HostRestorePhase, HostRestoreStats, RestoreSessionSpec, RestoreTarget, RestoreTargetSpec,
    };

    use crate::store::memory::MemoryStore;

    fn target() -> TargetRef {
        TargetRef::new("apps/v1", "StatefulSet", "restore-demo", "demo")
    }

    fn setup() -> (Arc<MemoryStore<RestoreSession>>, RestoreSessionInvoker) {
        let mut metadata = meta("restore-demo");
        metadata.creation_timestamp = Some(Time(Utc::now() - chrono::Duration::seconds(65)));
        let obj = RestoreSession {
            metadata,
            spec: RestoreSessionSpec {
                template: RestoreTargetSpec {
                    target: Some(RestoreTarget {
                        ref_: TargetRef::new("apps/v1", "StatefulSet", "restore-demo", ""),
                        replicas: Some(2),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                time_out: Some("10m".to_string()),
                ..Default::default()
            },
            status: None,
        };
        let store = Arc::new(MemoryStore::new());
        store.insert(obj.clone());
        let invoker = RestoreSessionInvoker::new(obj, store.clone(), fast_config());
        (store, invoker)
    }

    fn host(name: &str, phase: HostRestorePhase) -> HostRestoreStats {
        HostRestoreStats {
            hostname: name.to_string(),
            phase: Some(phase),
            duration: Some("12s".to_string()),
            error: None,
        }
    }

    #[test]
    fn test_single_target() {
        let (_, invoker) = setup();
        assert_eq!(invoker.target_refs(), vec![target()]);
        assert_eq!(invoker.target_infos()[0].target.as_ref().unwrap().replicas, Some(2));
        assert_eq!(invoker.execution_order(), ExecutionOrder::Parallel);
        assert!(invoker.global_hooks().is_none());
    }

    /// Story: a two-host restore goes from Pending to Succeeded as hosts report
    #[tokio::test]
    async fn story_restore_session_lifecycle() {
        let (store, invoker) = setup();
        let status = || store.current("demo", "restore-demo").status.unwrap();

        invoker
            .set_condition(None, Condition::truthy(REPOSITORY_FOUND, "RepositoryAvailable"))
            .await
            .unwrap();
        assert_eq!(status().phase, RestorePhase::Pending);

        let phase = invoker
            .update_status(&RestoreStatusUpdate {
                conditions: vec![
                    Condition::truthy(VALIDATION_PASSED, "Validated"),
                    Condition::truthy(RESTORE_EXECUTOR_ENSURED, "InitContainerInjected"),
                ],
                members: vec![RestoreMemberStatus {
                    ref_: target(),
                    total_hosts: Some(2),
                    stats: vec![host("host-0", HostRestorePhase::Succeeded)],
                    ..Default::default()
                }],
                session_deadline: None,
            })
            .await
            .unwrap();
        assert_eq!(phase, RestorePhase::Running);
        assert!(invoker.next_in_order(&target()).await.unwrap());

        invoker
            .update_status(&RestoreStatusUpdate {
                members: vec![RestoreMemberStatus {
                    ref_: target(),
                    stats: vec![host("host-1", HostRestorePhase::Succeeded)],
                    ..Default::default()
                }],
                ..Default::default()
            })
            .await
            .unwrap();
        let phase = invoker
            .update_status(&RestoreStatusUpdate {
                conditions: vec![Condition::truthy(METRICS_PUSHED, "MetricsPushed")],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(phase, RestorePhase::Succeeded);

        let done = status();
        assert_eq!(done.total_hosts, Some(2));
        assert_eq!(done.stats.len(), 2);
        assert!(done.session_duration.is_some());

        let members = invoker.members().await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].ref_, target());
    }

    #[tokio::test]
    async fn test_merge_retries_conflicts() {
        let (store, invoker) = setup();
        store.inject_conflicts(3);
        invoker
            .set_condition(None, Condition::truthy(REPOSITORY_FOUND, "RepositoryAvailable"))
            .await
            .unwrap();
        assert_eq!(store.write_attempts(), 4);
        assert_eq!(invoker.conditions(None).await.unwrap().len(), 1);
    }

    #[test]
    fn test_created_at_falls_back() {
        let now = Utc::now();
        assert_eq!(created_at(&ObjectMeta::default(), now), now);
    }
}
