//! Restic-side retention: `forget` arguments and executor task variables

use std::collections::BTreeMap;

use stash_common::crd::RetentionPolicy;

/// Task variable holding `keepLast`
pub const RETENTION_KEEP_LAST: &str = "RETENTION_KEEP_LAST";
/// Task variable holding `keepHourly`
pub const RETENTION_KEEP_HOURLY: &str = "RETENTION_KEEP_HOURLY";
/// Task variable holding `keepDaily`
pub const RETENTION_KEEP_DAILY: &str = "RETENTION_KEEP_DAILY";
/// Task variable holding `keepWeekly`
pub const RETENTION_KEEP_WEEKLY: &str = "RETENTION_KEEP_WEEKLY";
/// Task variable holding `keepMonthly`
pub const RETENTION_KEEP_MONTHLY: &str = "RETENTION_KEEP_MONTHLY";
/// Task variable holding `keepYearly`
pub const RETENTION_KEEP_YEARLY: &str = "RETENTION_KEEP_YEARLY";
/// Task variable holding `keepTags`, comma separated
pub const RETENTION_KEEP_TAGS: &str = "RETENTION_KEEP_TAGS";
/// Task variable set to `true` when pruning is requested
pub const RETENTION_PRUNE: &str = "RETENTION_PRUNE";
/// Task variable set to `true` for a dry run
pub const RETENTION_DRY_RUN: &str = "RETENTION_DRY_RUN";

fn counters(policy: &RetentionPolicy) -> [(&'static str, &'static str, i64); 6] {
    [
        ("--keep-last", RETENTION_KEEP_LAST, policy.keep_last),
        ("--keep-hourly", RETENTION_KEEP_HOURLY, policy.keep_hourly),
        ("--keep-daily", RETENTION_KEEP_DAILY, policy.keep_daily),
        ("--keep-weekly", RETENTION_KEEP_WEEKLY, policy.keep_weekly),
        ("--keep-monthly", RETENTION_KEEP_MONTHLY, policy.keep_monthly),
        ("--keep-yearly", RETENTION_KEEP_YEARLY, policy.keep_yearly),
    ]
}

/// Arguments for `restic forget` implementing `policy`.
///
/// Counters are emitted only when positive. `host` restricts the forget to
/// snapshots taken by one host.
pub fn forget_args(policy: &RetentionPolicy, host: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = vec!["forget".into(), "--quiet".into(), "--json".into()];

    if let Some(host) = host.filter(|h| !h.is_empty()) {
        args.push("--host".into());
        args.push(host.to_string());
    }

    for (flag, _, count) in counters(policy) {
        if count > 0 {
            args.push(flag.to_string());
            args.push(count.to_string());
        }
    }

    for tag in &policy.keep_tags {
        args.push("--keep-tag".into());
        args.push(tag.clone());
    }
    if policy.prune {
        args.push("--prune".into());
    }
    if policy.dry_run {
        args.push("--dry-run".into());
    }
    args
}

/// Task variables describing `policy` for executor workloads.
///
/// Only set values appear; an empty policy yields an empty map.
pub fn retention_variables(policy: &RetentionPolicy) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for (_, name, count) in counters(policy) {
        if count > 0 {
            vars.insert(name.to_string(), count.to_string());
        }
    }
    if !policy.keep_tags.is_empty() {
        vars.insert(RETENTION_KEEP_TAGS.to_string(), policy.keep_tags.join(","));
    }
    if policy.prune {
        vars.insert(RETENTION_PRUNE.to_string(), "true".to_string());
    }
    if policy.dry_run {
        vars.insert(RETENTION_DRY_RUN.to_string(), "true".to_string());
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetentionPolicy {
        RetentionPolicy {
            name: "keep-last-5".to_string(),
            keep_last: 5,
            keep_weekly: 2,
            keep_tags: vec!["nightly".to_string(), "release".to_string()],
            prune: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_forget_args() {
        assert_eq!(
            forget_args(&policy(), Some("host-0")),
            vec![
                "forget",
                "--quiet",
                "--json",
                "--host",
                "host-0",
                "--keep-last",
                "5",
                "--keep-weekly",
                "2",
                "--keep-tag",
                "nightly",
                "--keep-tag",
                "release",
                "--prune",
            ]
        );
    }

    #[test]
    fn test_forget_args_skip_zero_counters_and_empty_host() {
        let policy = RetentionPolicy {
            keep_daily: 7,
            keep_hourly: 0,
            dry_run: true,
            ..Default::default()
        };
        assert_eq!(
            forget_args(&policy, Some("")),
            vec!["forget", "--quiet", "--json", "--keep-daily", "7", "--dry-run"]
        );
        assert_eq!(
            forget_args(&RetentionPolicy::default(), None),
            vec!["forget", "--quiet", "--json"]
        );
    }

    #[test]
    fn test_retention_variables() {
        let vars = retention_variables(&policy());
        assert_eq!(vars.len(), 4);
        assert_eq!(vars[RETENTION_KEEP_LAST], "5");
        assert_eq!(vars[RETENTION_KEEP_WEEKLY], "2");
        assert_eq!(vars[RETENTION_KEEP_TAGS], "nightly,release");
        assert_eq!(vars[RETENTION_PRUNE], "true");
        assert!(!vars.contains_key(RETENTION_DRY_RUN));

        assert!(retention_variables(&RetentionPolicy::default()).is_empty());
    }
}
