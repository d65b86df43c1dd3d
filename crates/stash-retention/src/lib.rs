//! Retention engine for Stash backups
//!
//! Restic repositories are pruned by the restic binary itself; for those this
//! crate only renders the `forget` arguments and the task variables handed to
//! executor workloads ([`policy`]). Volume snapshots have no such tool, so the
//! time-bucketed keep/remove partition is computed here ([`bucket`]) and
//! applied against the cluster ([`volume_snapshot`]).

#![deny(missing_docs)]

pub mod bucket;
pub mod policy;
pub mod volume_snapshot;

pub use bucket::{partition, partition_by_owner, Artifact, Partition};
pub use policy::{forget_args, retention_variables};
pub use volume_snapshot::{
    cleanup_snapshots, CleanupReport, KubeSnapshotClient, SnapshotClient, VolumeSnapshot,
};
