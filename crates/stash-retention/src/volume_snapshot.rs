//! VolumeSnapshot retention
//!
//! Snapshots taken by the volume-snapshotter driver are grouped by their
//! source PVC (one group per backed-up host) and each group is partitioned
//! with the bucket algorithm. Removed snapshots are deleted one by one; a
//! failed delete does not stop the rest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stash_common::crd::{HostBackupStats, RetentionPolicy};
use stash_common::kube_utils::HasApiResource;
use stash_common::{Error, Result};

use crate::bucket::{partition_by_owner, Artifact};

// =============================================================================
// VolumeSnapshot
// =============================================================================

/// CSI VolumeSnapshot, reduced to what retention reads
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshot {
    /// API version
    #[serde(default = "VolumeSnapshot::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "VolumeSnapshot::default_kind")]
    pub kind: String,
    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Snapshot specification
    #[serde(default)]
    pub spec: VolumeSnapshotSpec,
    /// Snapshot status as reported by the snapshot controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VolumeSnapshotStatus>,
}

/// Desired state of a VolumeSnapshot
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSpec {
    /// What the snapshot was taken from
    #[serde(default)]
    pub source: VolumeSnapshotSource,
    /// Snapshot class used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,
}

/// Source of a VolumeSnapshot; exactly one field is set
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSource {
    /// PVC the snapshot was taken from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim_name: Option<String>,
    /// Pre-provisioned snapshot content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_content_name: Option<String>,
}

/// Observed state of a VolumeSnapshot
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotStatus {
    /// When the storage system cut the snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<Time>,
    /// Whether the snapshot can be restored from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,
    /// Bound snapshot content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_volume_snapshot_content_name: Option<String>,
}

impl HasApiResource for VolumeSnapshot {
    const API_VERSION: &'static str = "snapshot.storage.k8s.io/v1";
    const KIND: &'static str = "VolumeSnapshot";
}

impl VolumeSnapshot {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Snapshot of `pvc` named `name`, created at `created`
    pub fn new(name: impl Into<String>, pvc: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: ObjectMeta {
                name: Some(name.into()),
                creation_timestamp: Some(Time(created)),
                ..Default::default()
            },
            spec: VolumeSnapshotSpec {
                source: VolumeSnapshotSource {
                    persistent_volume_claim_name: Some(pvc.into()),
                    volume_snapshot_content_name: None,
                },
                volume_snapshot_class_name: None,
            },
            status: None,
        }
    }

    /// Object name, empty when unset
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Source PVC name, empty for content-sourced snapshots
    pub fn source_pvc(&self) -> &str {
        self.spec
            .source
            .persistent_volume_claim_name
            .as_deref()
            .unwrap_or_default()
    }
}

impl Artifact for VolumeSnapshot {
    /// Object creation time; snapshots without one sort as the oldest
    fn created(&self) -> DateTime<Utc> {
        self.metadata
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn owner(&self) -> &str {
        self.source_pvc()
    }
}

// =============================================================================
// Client
// =============================================================================

/// Access to VolumeSnapshots in a namespace
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotClient: Send + Sync {
    /// List every VolumeSnapshot in `namespace`
    async fn list(&self, namespace: &str) -> Result<Vec<VolumeSnapshot>>;

    /// Delete one VolumeSnapshot
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// [`SnapshotClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSnapshotClient {
    client: Client,
}

impl KubeSnapshotClient {
    /// Create a client over an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            namespace,
            &VolumeSnapshot::api_resource(),
        )
    }
}

#[async_trait]
impl SnapshotClient for KubeSnapshotClient {
    async fn list(&self, namespace: &str) -> Result<Vec<VolumeSnapshot>> {
        let list = self
            .api(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::from_kube(VolumeSnapshot::KIND, namespace, "", e))?;

        list.items
            .into_iter()
            .map(|obj| {
                let value = serde_json::to_value(obj)
                    .map_err(|e| Error::serialization_for_kind(VolumeSnapshot::KIND, e.to_string()))?;
                serde_json::from_value(value)
                    .map_err(|e| Error::serialization_for_kind(VolumeSnapshot::KIND, e.to_string()))
            })
            .collect()
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::from_kube(VolumeSnapshot::KIND, namespace, name, e))?;
        Ok(())
    }
}

// =============================================================================
// Cleanup
// =============================================================================

/// What a cleanup pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Snapshots retained by the policy
    pub kept: usize,
    /// Snapshots deleted, or already gone
    pub removed: Vec<String>,
    /// Snapshots whose delete failed
    pub failed: Vec<String>,
}

/// Apply `policy` to the snapshots of every host in `hosts`.
///
/// Each host's hostname is matched against the snapshots' source PVC. A
/// snapshot that is already gone counts as removed. Deletes continue past
/// failures and the first failure is returned once all were attempted.
pub async fn cleanup_snapshots(
    client: &dyn SnapshotClient,
    policy: &RetentionPolicy,
    hosts: &[HostBackupStats],
    namespace: &str,
) -> Result<CleanupReport> {
    let snapshots = match client.list(namespace).await {
        Ok(snapshots) => snapshots,
        Err(e) if e.is_not_found() => return Ok(CleanupReport::default()),
        Err(e) => return Err(e),
    };

    let owned: Vec<VolumeSnapshot> = snapshots
        .into_iter()
        .filter(|s| hosts.iter().any(|h| h.hostname == s.source_pvc()))
        .collect();

    let mut report = CleanupReport::default();
    let mut first_error = None;
    for (pvc, split) in partition_by_owner(policy, &owned) {
        report.kept += split.keep.len();
        for snapshot in split.remove {
            match client.delete(namespace, snapshot.name()).await {
                Ok(()) => report.removed.push(snapshot.name().to_string()),
                Err(e) if e.is_not_found() => report.removed.push(snapshot.name().to_string()),
                Err(e) => {
                    warn!(
                        namespace = %namespace,
                        pvc = %pvc,
                        snapshot = %snapshot.name(),
                        error = %e,
                        "failed to delete VolumeSnapshot"
                    );
                    report.failed.push(snapshot.name().to_string());
                    if first_error.is_none() {
                        first_error = Some(Error::retention_for(snapshot.name(), e.to_string()));
                    }
                }
            }
        }
    }

    info!(
        namespace = %namespace,
        kept = report.kept,
        removed = report.removed.len(),
        failed = report.failed.len(),
        "VolumeSnapshot retention applied"
    );

    match first_error {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    fn snapshots() -> Vec<VolumeSnapshot> {
        vec![
            VolumeSnapshot::new("snap-1", "pvc-1", at("2019-12-10T05:36:07Z")),
            VolumeSnapshot::new("snap-2", "pvc-1", at("2019-11-10T05:36:07Z")),
            VolumeSnapshot::new("snap-3", "pvc-1", at("2019-10-10T05:36:07Z")),
            VolumeSnapshot::new("snap-10", "pvc-2", at("2019-12-10T05:36:07Z")),
            VolumeSnapshot::new("snap-11", "pvc-2", at("2019-10-10T05:36:07Z")),
            VolumeSnapshot::new("other", "pvc-unrelated", at("2015-01-01T00:00:00Z")),
        ]
    }

    fn host(name: &str) -> HostBackupStats {
        HostBackupStats {
            hostname: name.to_string(),
            ..Default::default()
        }
    }

    fn keep_last(n: i64) -> RetentionPolicy {
        RetentionPolicy {
            keep_last: n,
            ..Default::default()
        }
    }

    /// Records deletes; names listed in `missing` are reported NotFound and
    /// names in `broken` fail
    fn mock_client(
        missing: &'static [&'static str],
        broken: &'static [&'static str],
    ) -> (MockSnapshotClient, Arc<Mutex<Vec<String>>>) {
        let deleted = Arc::new(Mutex::new(Vec::new()));
        let recorder = deleted.clone();

        let mut client = MockSnapshotClient::new();
        client.expect_list().returning(|_| Ok(snapshots()));
        client.expect_delete().returning(move |namespace, name| {
            recorder
                .lock()
                .expect("mutex should not be poisoned")
                .push(name.to_string());
            if missing.contains(&name) {
                return Err(Error::not_found(VolumeSnapshot::KIND, namespace, name));
            }
            if broken.contains(&name) {
                return Err(Error::internal_with_context("test", "snapshot is being used"));
            }
            Ok(())
        });
        (client, deleted)
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::json!({
            "apiVersion": "snapshot.storage.k8s.io/v1",
            "kind": "VolumeSnapshot",
            "metadata": {"name": "data-db-0-1700000000", "namespace": "demo"},
            "spec": {
                "source": {"persistentVolumeClaimName": "data-db-0"},
                "volumeSnapshotClassName": "csi-snapclass"
            },
            "status": {"readyToUse": true}
        });
        let snapshot: VolumeSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(snapshot.source_pvc(), "data-db-0");
        assert_eq!(snapshot.owner(), "data-db-0");
        assert_eq!(snapshot.status.unwrap().ready_to_use, Some(true));
        assert_eq!(VolumeSnapshot::api_resource().plural, "volumesnapshots");
    }

    #[test]
    fn test_missing_timestamp_sorts_oldest() {
        let mut snapshot = VolumeSnapshot::new("x", "pvc-1", Utc::now());
        snapshot.metadata.creation_timestamp = None;
        assert_eq!(snapshot.created(), DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn test_cleanup_removes_per_pvc() {
        let (client, deleted) = mock_client(&[], &[]);
        let report = cleanup_snapshots(
            &client,
            &keep_last(1),
            &[host("pvc-1"), host("pvc-2")],
            "demo",
        )
        .await
        .unwrap();

        assert_eq!(report.kept, 2);
        assert_eq!(report.removed, vec!["snap-2", "snap-3", "snap-11"]);
        assert_eq!(
            *deleted.lock().unwrap(),
            vec!["snap-2".to_string(), "snap-3".to_string(), "snap-11".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unlisted_hosts_untouched() {
        let (client, deleted) = mock_client(&[], &[]);
        let report = cleanup_snapshots(&client, &keep_last(1), &[host("pvc-2")], "demo")
            .await
            .unwrap();
        assert_eq!(report.removed, vec!["snap-11"]);
        assert!(!deleted.lock().unwrap().contains(&"other".to_string()));
    }

    #[tokio::test]
    async fn test_empty_policy_deletes_nothing() {
        let mut client = MockSnapshotClient::new();
        client.expect_list().returning(|_| Ok(snapshots()));
        client.expect_delete().never();

        let report = cleanup_snapshots(
            &client,
            &RetentionPolicy::default(),
            &[host("pvc-1"), host("pvc-2")],
            "demo",
        )
        .await
        .unwrap();
        assert_eq!(report.kept, 5);
        assert!(report.removed.is_empty());
    }

    #[tokio::test]
    async fn test_already_deleted_counts_as_removed() {
        let (client, _) = mock_client(&["snap-2"], &[]);
        let report = cleanup_snapshots(&client, &keep_last(1), &[host("pvc-1")], "demo")
            .await
            .unwrap();
        assert_eq!(report.removed, vec!["snap-2", "snap-3"]);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_cleanup() {
        let (client, deleted) = mock_client(&[], &["snap-2"]);
        let err = cleanup_snapshots(
            &client,
            &keep_last(1),
            &[host("pvc-1"), host("pvc-2")],
            "demo",
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Retention { snapshot: Some(ref s), .. } if s == "snap-2"
        ));
        assert_eq!(deleted.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_not_found_is_empty() {
        let mut client = MockSnapshotClient::new();
        client
            .expect_list()
            .returning(|ns| Err(Error::not_found(VolumeSnapshot::KIND, ns, "")));
        client.expect_delete().never();

        let report = cleanup_snapshots(&client, &keep_last(1), &[host("pvc-1")], "demo")
            .await
            .unwrap();
        assert_eq!(report, CleanupReport::default());
    }
}
