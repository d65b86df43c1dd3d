//! Time-bucketed keep/remove partition
//!
//! Artifacts are walked newest first. Each policy dimension owns a bucket
//! with a remaining count and the key of the last artifact it kept; an
//! artifact whose key differs from that last key is kept by the bucket.
//! An artifact survives if any bucket keeps it.

use chrono::{DateTime, Datelike, Timelike, Utc};

use stash_common::crd::RetentionPolicy;

/// Something with a creation time that retention can remove
pub trait Artifact {
    /// When the artifact was created
    fn created(&self) -> DateTime<Utc>;

    /// Independent stream the artifact belongs to (e.g., the source PVC)
    fn owner(&self) -> &str {
        ""
    }
}

/// Result of applying a policy to a list of artifacts
#[derive(Debug)]
pub struct Partition<'a, A> {
    /// Artifacts to keep, newest first
    pub keep: Vec<&'a A>,
    /// Artifacts to remove, newest first
    pub remove: Vec<&'a A>,
}

impl<A> Default for Partition<'_, A> {
    fn default() -> Self {
        Self {
            keep: Vec::new(),
            remove: Vec::new(),
        }
    }
}

type KeyFn = fn(DateTime<Utc>, usize) -> i64;

fn ordinal(_: DateTime<Utc>, nr: usize) -> i64 {
    nr as i64
}

fn hour_key(t: DateTime<Utc>, _: usize) -> i64 {
    t.year() as i64 * 1_000_000
        + t.month() as i64 * 10_000
        + t.day() as i64 * 100
        + t.hour() as i64
}

fn day_key(t: DateTime<Utc>, _: usize) -> i64 {
    t.year() as i64 * 10_000 + t.month() as i64 * 100 + t.day() as i64
}

fn week_key(t: DateTime<Utc>, _: usize) -> i64 {
    let week = t.iso_week();
    week.year() as i64 * 100 + week.week() as i64
}

fn month_key(t: DateTime<Utc>, _: usize) -> i64 {
    t.year() as i64 * 100 + t.month() as i64
}

fn year_key(t: DateTime<Utc>, _: usize) -> i64 {
    t.year() as i64
}

struct Bucket {
    remaining: i64,
    key: KeyFn,
    last: Option<i64>,
}

impl Bucket {
    fn new(remaining: i64, key: KeyFn) -> Self {
        Self {
            remaining,
            key,
            last: None,
        }
    }
}

fn buckets(policy: &RetentionPolicy) -> [Bucket; 6] {
    [
        Bucket::new(policy.keep_last, ordinal),
        Bucket::new(policy.keep_hourly, hour_key),
        Bucket::new(policy.keep_daily, day_key),
        Bucket::new(policy.keep_weekly, week_key),
        Bucket::new(policy.keep_monthly, month_key),
        Bucket::new(policy.keep_yearly, year_key),
    ]
}

/// Split `artifacts` into the ones `policy` keeps and the ones it removes.
///
/// Ties in creation time keep their listing order. An empty policy keeps
/// everything. Owners are ignored; see [`partition_by_owner`].
pub fn partition<'a, A: Artifact>(policy: &RetentionPolicy, artifacts: &'a [A]) -> Partition<'a, A> {
    let mut sorted: Vec<&A> = artifacts.iter().collect();
    sorted.sort_by(|a, b| b.created().cmp(&a.created()));

    if policy.is_empty() {
        return Partition {
            keep: sorted,
            remove: Vec::new(),
        };
    }

    let mut buckets = buckets(policy);
    let mut result = Partition::default();
    for (nr, artifact) in sorted.into_iter().enumerate() {
        let created = artifact.created();
        let mut keep = false;
        for bucket in buckets.iter_mut().filter(|b| b.remaining > 0) {
            let key = (bucket.key)(created, nr);
            if bucket.last != Some(key) {
                keep = true;
                bucket.last = Some(key);
                bucket.remaining -= 1;
            }
        }

        if keep {
            result.keep.push(artifact);
        } else {
            result.remove.push(artifact);
        }
    }
    result
}

/// [`partition`] applied to each owner's artifacts independently
pub fn partition_by_owner<'a, A: Artifact>(
    policy: &RetentionPolicy,
    artifacts: &'a [A],
) -> Vec<(String, Partition<'a, A>)> {
    let mut owners: Vec<&str> = Vec::new();
    for artifact in artifacts {
        if !owners.contains(&artifact.owner()) {
            owners.push(artifact.owner());
        }
    }

    owners
        .into_iter()
        .map(|owner| {
            let group: Vec<&'a A> = artifacts.iter().filter(|a| a.owner() == owner).collect();
            let split = partition_refs(policy, group);
            (owner.to_string(), split)
        })
        .collect()
}

fn partition_refs<'a, A: Artifact>(policy: &RetentionPolicy, group: Vec<&'a A>) -> Partition<'a, A> {
    let refs: Vec<Ref<'a, A>> = group.into_iter().map(Ref).collect();
    let split = partition(policy, &refs);
    Partition {
        keep: split.keep.into_iter().map(|r| r.0).collect(),
        remove: split.remove.into_iter().map(|r| r.0).collect(),
    }
}

struct Ref<'a, A>(&'a A);

impl<A: Artifact> Artifact for Ref<'_, A> {
    fn created(&self) -> DateTime<Utc> {
        self.0.created()
    }

    fn owner(&self) -> &str {
        self.0.owner()
    }
}
