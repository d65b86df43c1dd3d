//! BackupSession status writer
//!
//! Executors report per-host results as partial [`BackupSessionStatus`]
//! fragments. [`BackupSessionStore::update_status`] merges each fragment into
//! the stored status under optimistic concurrency and recomputes the phase.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use kube::Client;
use tracing::{debug, info};

use stash_common::crd::{
    BackupSession, BackupSessionPhase, BackupSessionSpec, BackupSessionStatus, BackupTargetStatus,
    Condition, SessionRetryConfig, TargetRef,
};
use stash_common::duration::parse_duration;
use stash_common::target::find_by_target;
use stash_common::{Error, Result};

use crate::coordinator::is_eligible;
use crate::invoker::BackupInvoker;
use crate::merge::{merge_backup_session_status, upsert_backup_target};
use crate::store::{update_status_with_retry, KubeStore, ResourceStore, StatusStoreConfig};

/// Reads and writes BackupSessions through a [`ResourceStore`]
#[derive(Clone)]
pub struct BackupSessionStore {
    store: Arc<dyn ResourceStore<BackupSession>>,
    config: StatusStoreConfig,
}

impl BackupSessionStore {
    /// Wrap an existing store
    pub fn new(store: Arc<dyn ResourceStore<BackupSession>>, config: StatusStoreConfig) -> Self {
        Self { store, config }
    }

    /// Store backed by the Kubernetes API server
    pub fn from_client(client: Client, config: StatusStoreConfig) -> Self {
        let store = Arc::new(KubeStore::new(client, &config));
        Self::new(store, config)
    }

    /// Fetch the latest version of a session
    pub async fn get(&self, namespace: &str, name: &str) -> Result<BackupSession> {
        self.store.get(namespace, name).await
    }

    /// Merge a partial status and return the resulting phase.
    ///
    /// Re-applying the same fragment is a no-op.
    pub async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        partial: &BackupSessionStatus,
    ) -> Result<BackupSessionPhase> {
        let now = Utc::now();
        let updated = update_status_with_retry(
            self.store.as_ref(),
            &self.config,
            namespace,
            name,
            |mut session: BackupSession| {
                let created = session
                    .metadata
                    .creation_timestamp
                    .as_ref()
                    .map(|t| t.0)
                    .unwrap_or(now);
                let current = session.status.take().unwrap_or_default();
                session.status = Some(merge_backup_session_status(&current, partial, created, now));
                (session, true)
            },
        )
        .await?;

        let status = updated.status.unwrap_or_default();
        if status.phase.is_terminal() {
            info!(
                session = %name,
                namespace = %namespace,
                phase = %status.phase,
                duration = ?status.session_duration,
                "backup session finished"
            );
        } else {
            debug!(session = %name, phase = %status.phase, "backup session status merged");
        }
        Ok(status.phase)
    }

    /// Read a ledger: the target's when `target` is set, else the session's
    pub async fn conditions(
        &self,
        namespace: &str,
        name: &str,
        target: Option<&TargetRef>,
    ) -> Result<Vec<Condition>> {
        let status = self.get(namespace, name).await?.status.unwrap_or_default();
        Ok(match target {
            Some(target) => find_by_target(&status.targets, target)
                .map(|t| t.conditions.clone())
                .unwrap_or_default(),
            None => status.conditions,
        })
    }

    /// Upsert a condition into the session or target ledger and recompute phases
    pub async fn set_condition(
        &self,
        namespace: &str,
        name: &str,
        target: Option<&TargetRef>,
        condition: Condition,
    ) -> Result<BackupSessionPhase> {
        let partial = match target {
            Some(target) => BackupSessionStatus {
                targets: vec![BackupTargetStatus {
                    ref_: target.clone(),
                    conditions: vec![condition],
                    ..Default::default()
                }],
                ..Default::default()
            },
            None => BackupSessionStatus {
                conditions: vec![condition],
                ..Default::default()
            },
        };
        self.update_status(namespace, name, &partial).await
    }

    /// Record the targets a session will run, each starting as Pending.
    ///
    /// Targets already present are left untouched.
    pub async fn initialize_targets(
        &self,
        namespace: &str,
        name: &str,
        targets: &[TargetRef],
        deadline: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut partial = BackupSessionStatus {
            session_deadline: deadline,
            ..Default::default()
        };
        for target in targets {
            upsert_backup_target(
                &mut partial.targets,
                &BackupTargetStatus {
                    ref_: target.clone(),
                    ..Default::default()
                },
            );
        }
        self.update_status(namespace, name, &partial).await?;
        Ok(())
    }

    /// Stamp a created retry session and the failed session it replaces.
    ///
    /// `retried` lands on `retry` and `nextRetry` on `failed`. Both are
    /// set-once, so stamping the same pair again leaves the first values.
    pub async fn record_retry(
        &self,
        namespace: &str,
        failed: &str,
        retry: &str,
        next_retry: DateTime<Utc>,
    ) -> Result<()> {
        let retried = BackupSessionStatus {
            retried: Some(true),
            ..Default::default()
        };
        self.update_status(namespace, retry, &retried).await?;

        let scheduled = BackupSessionStatus {
            next_retry: Some(next_retry),
            ..Default::default()
        };
        self.update_status(namespace, failed, &scheduled).await?;

        info!(
            session = %failed,
            retry = %retry,
            namespace = %namespace,
            next_retry = %next_retry,
            "backup session retry recorded"
        );
        Ok(())
    }

    /// Whether `candidate` may start in this session
    pub async fn next_in_order(
        &self,
        invoker: &dyn BackupInvoker,
        namespace: &str,
        name: &str,
        candidate: &TargetRef,
    ) -> Result<bool> {
        let session = self.get(namespace, name).await?;
        let observed = session.status.map(|s| s.targets).unwrap_or_default();
        Ok(is_eligible(
            invoker.execution_order(),
            &invoker.target_refs(),
            candidate,
            &observed,
        ))
    }
}

/// When a failed session should be retried, if at all.
///
/// Only a `Failed` session with `retryLeft > 0` is retried; the delay comes
/// from the invoker's retry config and defaults to immediately.
pub fn plan_retry(
    session: &BackupSession,
    retry: Option<&SessionRetryConfig>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let phase = session
        .status
        .as_ref()
        .map(|s| s.phase)
        .unwrap_or_default();
    if phase != BackupSessionPhase::Failed || session.spec.retry_left <= 0 {
        return Ok(None);
    }
    let delay = match retry.and_then(|r| r.delay.as_deref()) {
        Some(raw) => ChronoDuration::from_std(parse_duration(raw)?)
            .map_err(|e| Error::validation_for_field("BackupSession", "spec.retryConfig.delay", e.to_string()))?,
        None => ChronoDuration::zero(),
    };
    Ok(Some(now + delay))
}

/// Build the session that retries `failed`, started at `now`.
///
/// The retry keeps the invoker reference, labels and owners of the failed
/// session and consumes one retry. It carries no status: the server drops
/// status on create, so [`BackupSessionStore::record_retry`] stamps it after
/// the object exists.
pub fn retry_session(failed: &BackupSession, now: DateTime<Utc>) -> Result<BackupSession> {
    if failed.spec.retry_left <= 0 {
        return Err(Error::validation_for_field(
            "BackupSession",
            "spec.retryLeft",
            "no retries left",
        ));
    }
    let spec = BackupSessionSpec {
        invoker: failed.spec.invoker.clone(),
        retry_left: failed.spec.retry_left - 1,
    };
    let mut session =
        BackupSession::new(&format!("{}-{}", failed.spec.invoker.name, now.timestamp()), spec);
    session.metadata.namespace = failed.metadata.namespace.clone();
    session.metadata.labels = failed.metadata.labels.clone();
    session.metadata.owner_references = failed.metadata.owner_references.clone();
    Ok(session)
}
