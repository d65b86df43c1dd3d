//! Session Status Store
//!
//! Every write to an invoker or session is a read-modify-write: fetch the
//! latest object, apply a pure transform, write it back. The API server
//! rejects the write with a conflict when another writer got there first;
//! the loop then refetches and tries again within the retry budget. Any
//! other error is returned to the caller untouched.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use stash_common::retry::{retry_with_backoff_when, RetryConfig};
use stash_common::{Error, Result, FIELD_MANAGER};

#[cfg(test)]
pub(crate) mod memory;

/// Configuration threaded into every store-backed writer
#[derive(Clone, Debug, PartialEq)]
pub struct StatusStoreConfig {
    /// Write status through the `/status` subresource; plain replace when false
    pub status_subresource: bool,
    /// Retry budget for conflicting writes
    pub retry: RetryConfig,
    /// Field manager recorded on every write
    pub field_manager: String,
}

impl Default for StatusStoreConfig {
    fn default() -> Self {
        Self {
            status_subresource: true,
            retry: RetryConfig {
                max_attempts: 5,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(2),
                backoff_multiplier: 2.0,
            },
            field_manager: FIELD_MANAGER.to_string(),
        }
    }
}

/// Versioned object storage with optimistic concurrency.
///
/// `replace` and `replace_status` must fail with [`Error::Conflict`] when the
/// object's resourceVersion no longer matches the stored one.
#[async_trait]
pub trait ResourceStore<K>: Send + Sync
where
    K: Clone + Send + Sync + 'static,
{
    /// Fetch the latest version of an object
    async fn get(&self, namespace: &str, name: &str) -> Result<K>;

    /// Replace the whole object
    async fn replace(&self, obj: &K) -> Result<K>;

    /// Replace the status of the object
    async fn replace_status(&self, obj: &K) -> Result<K>;
}

/// [`ResourceStore`] backed by the Kubernetes API server
pub struct KubeStore<K> {
    client: Client,
    field_manager: String,
    _marker: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    /// Create a store for the given resource type
    pub fn new(client: Client, config: &StatusStoreConfig) -> Self {
        Self {
            client,
            field_manager: config.field_manager.clone(),
            _marker: PhantomData,
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

fn identity<K: Resource>(obj: &K) -> Result<(String, String)> {
    let meta = obj.meta();
    match (&meta.namespace, &meta.name) {
        (Some(ns), Some(name)) => Ok((ns.clone(), name.clone())),
        _ => Err(Error::internal_with_context(
            "status-store",
            "object is missing namespace or name",
        )),
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| Error::from_kube(K::kind(&()), namespace, name, e))
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let (namespace, name) = identity(obj)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&name, &self.post_params(), obj)
            .await
            .map_err(|e| Error::from_kube(K::kind(&()), &namespace, &name, e))
    }

    async fn replace_status(&self, obj: &K) -> Result<K> {
        let (namespace, name) = identity(obj)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        let data = serde_json::to_vec(obj)?;
        api.replace_status(&name, &self.post_params(), data)
            .await
            .map_err(|e| Error::from_kube(K::kind(&()), &namespace, &name, e))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriteTarget {
    Object,
    Status,
}

/// Read-modify-write the whole object (metadata and spec changes, e.g. finalizers).
///
/// `transform` returns the updated object and whether a conflict on this
/// write should be retried. Returning `false` turns a conflict into a final
/// error. The transform must be a pure function of its input.
pub async fn update_with_retry<K, S, F>(
    store: &S,
    config: &StatusStoreConfig,
    namespace: &str,
    name: &str,
    transform: F,
) -> Result<K>
where
    K: Clone + Send + Sync + 'static,
    S: ResourceStore<K> + ?Sized,
    F: Fn(K) -> (K, bool),
{
    read_modify_write(store, config, WriteTarget::Object, namespace, name, transform).await
}

/// Read-modify-write the status of an object.
///
/// Writes through the status subresource unless the config disables it.
pub async fn update_status_with_retry<K, S, F>(
    store: &S,
    config: &StatusStoreConfig,
    namespace: &str,
    name: &str,
    transform: F,
) -> Result<K>
where
    K: Clone + Send + Sync + 'static,
    S: ResourceStore<K> + ?Sized,
    F: Fn(K) -> (K, bool),
{
    let target = if config.status_subresource {
        WriteTarget::Status
    } else {
        WriteTarget::Object
    };
    read_modify_write(store, config, target, namespace, name, transform).await
}

async fn read_modify_write<K, S, F>(
    store: &S,
    config: &StatusStoreConfig,
    target: WriteTarget,
    namespace: &str,
    name: &str,
    transform: F,
) -> Result<K>
where
    K: Clone + Send + Sync + 'static,
    S: ResourceStore<K> + ?Sized,
    F: Fn(K) -> (K, bool),
{
    let transform = &transform;
    let operation = format!("update {}/{}", namespace, name);
    retry_with_backoff_when(
        &config.retry,
        &operation,
        Error::is_retryable_conflict,
        move || async move {
            let current = store.get(namespace, name).await?;
            let (updated, retry_on_conflict) = transform(current);
            let written = match target {
                WriteTarget::Object => store.replace(&updated).await,
                WriteTarget::Status => store.replace_status(&updated).await,
            };
            match written {
                Err(e) if e.is_conflict() && !retry_on_conflict => {
                    Err(e.into_final_conflict())
                }
                Err(e) => Err(e),
                Ok(obj) => {
                    debug!(namespace = %namespace, name = %name, "write accepted");
                    Ok(obj)
                }
            }
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use stash_common::crd::{BackupSession, BackupSessionSpec, BackupSessionStatus};

    fn session(name: &str) -> BackupSession {
        let mut s = BackupSession::new(name, BackupSessionSpec::default());
        s.metadata.namespace = Some("demo".to_string());
        s
    }

    fn fast_config() -> StatusStoreConfig {
        StatusStoreConfig {
            retry: RetryConfig {
                max_attempts: 5,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                backoff_multiplier: 1.0,
            },
            ..Default::default()
        }
    }

    fn set_duration(mut s: BackupSession) -> (BackupSession, bool) {
        let status = s.status.get_or_insert_with(BackupSessionStatus::default);
        status.session_duration = Some("1s".to_string());
        (s, true)
    }

    #[test]
    fn test_default_config() {
        let config = StatusStoreConfig::default();
        assert!(config.status_subresource);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_delay, Duration::from_secs(2));
        assert_eq!(config.field_manager, FIELD_MANAGER);
    }

    /// Story: a write that collides with a concurrent writer is retried against
    /// the fresh object and eventually lands
    #[tokio::test]
    async fn story_conflicts_are_retried_until_write_lands() {
        let store = MemoryStore::new();
        store.insert(session("s1"));
        store.inject_conflicts(2);

        let updated = update_status_with_retry(&store, &fast_config(), "demo", "s1", set_duration)
            .await
            .expect("write should land after conflicts");

        assert_eq!(
            updated.status.unwrap().session_duration.as_deref(),
            Some("1s")
        );
        assert_eq!(store.write_attempts(), 3);
    }

    #[tokio::test]
    async fn test_conflicts_exhaust_budget() {
        let store = MemoryStore::new();
        store.insert(session("s1"));
        store.inject_conflicts(10);

        let err = update_status_with_retry(&store, &fast_config(), "demo", "s1", set_duration)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.write_attempts(), 5);
    }

    #[tokio::test]
    async fn test_transform_can_refuse_conflict_retry() {
        let store = MemoryStore::new();
        store.insert(session("s1"));
        store.inject_conflicts(1);

        let err = update_status_with_retry(&store, &fast_config(), "demo", "s1", |s| (s, false))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(!err.is_retryable_conflict());
        assert_eq!(store.write_attempts(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let store = MemoryStore::<BackupSession>::new();
        let err = update_status_with_retry(&store, &fast_config(), "demo", "missing", set_duration)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.write_attempts(), 0);
    }

    #[tokio::test]
    async fn test_status_subresource_disabled_uses_replace() {
        let store = MemoryStore::new();
        store.insert(session("s1"));
        let config = StatusStoreConfig {
            status_subresource: false,
            ..fast_config()
        };

        update_status_with_retry(&store, &config, "demo", "s1", set_duration)
            .await
            .unwrap();
        assert_eq!(store.status_writes(), 0);
        assert_eq!(store.object_writes(), 1);
    }
}
