//! In-memory versioned store for tests
//!
//! Mirrors API server optimistic concurrency: each write must carry the
//! current resourceVersion, and every accepted write bumps it. Conflicts can
//! be injected to simulate a concurrent writer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use kube::Resource;

use super::ResourceStore;
use stash_common::{Error, Result};

pub(crate) struct MemoryStore<K> {
    objects: Mutex<HashMap<(String, String), K>>,
    pending_conflicts: AtomicU32,
    write_attempts: AtomicU32,
    object_writes: AtomicU32,
    status_writes: AtomicU32,
}

impl<K> MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            pending_conflicts: AtomicU32::new(0),
            write_attempts: AtomicU32::new(0),
            object_writes: AtomicU32::new(0),
            status_writes: AtomicU32::new(0),
        }
    }

    pub(crate) fn insert(&self, mut obj: K) {
        let key = key_of(&obj);
        obj.meta_mut().resource_version = Some("1".to_string());
        self.objects.lock().unwrap().insert(key, obj);
    }

    pub(crate) fn inject_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    pub(crate) fn current(&self, namespace: &str, name: &str) -> K {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .expect("object present")
    }

    pub(crate) fn write_attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn object_writes(&self) -> u32 {
        self.object_writes.load(Ordering::SeqCst)
    }

    pub(crate) fn status_writes(&self) -> u32 {
        self.status_writes.load(Ordering::SeqCst)
    }

    fn write(&self, obj: &K) -> Result<K> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let key = key_of(obj);
        let kind = K::kind(&()).to_string();

        let injected = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::conflict(kind, &key.1));
        }

        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get(&key)
            .ok_or_else(|| Error::not_found(&kind, &key.0, &key.1))?;
        if stored.meta().resource_version != obj.meta().resource_version {
            return Err(Error::conflict(kind, &key.1));
        }

        let next: u64 = stored
            .meta()
            .resource_version
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
            + 1;
        let mut updated = obj.clone();
        updated.meta_mut().resource_version = Some(next.to_string());
        objects.insert(key, updated.clone());
        Ok(updated)
    }
}

fn key_of<K: Resource>(obj: &K) -> (String, String) {
    let meta = obj.meta();
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

#[async_trait]
impl<K> ResourceStore<K> for MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found(K::kind(&()), namespace, name))
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let written = self.write(obj)?;
        self.object_writes.fetch_add(1, Ordering::SeqCst);
        Ok(written)
    }

    async fn replace_status(&self, obj: &K) -> Result<K> {
        let written = self.write(obj)?;
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(written)
    }
}
