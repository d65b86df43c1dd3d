//! Shared Kubernetes utilities
//!
//! API resource construction for typed external resources, finalizer list
//! handling, object trimming for hook payloads, and stable hashing.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::discovery::ApiResource;
use serde::Serialize;

use crate::{Error, Result};

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Trait for types that have a known API group, version, and kind.
///
/// Implement this for external resource types (e.g., `VolumeSnapshot`) that
/// are accessed through `DynamicObject`, so that the `ApiResource` used for
/// API calls always matches what the type serializes.
pub trait HasApiResource {
    /// Full API version (e.g., "snapshot.storage.k8s.io/v1", "v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "VolumeSnapshot")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an ApiResource from a known apiVersion and kind.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version). Core resources have an empty group.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

const KIND_PLURALS: &[(&str, &str)] = &[
    ("backupconfiguration", "backupconfigurations"),
    ("backupbatch", "backupbatches"),
    ("backupsession", "backupsessions"),
    ("restoresession", "restoresessions"),
    ("restorebatch", "restorebatches"),
    ("volumesnapshot", "volumesnapshots"),
    ("volumesnapshotclass", "volumesnapshotclasses"),
    ("persistentvolumeclaim", "persistentvolumeclaims"),
];

/// Pluralize a Kubernetes resource kind
///
/// Uses a lookup table for known kinds, falling back to simple
/// pluralization rules for unknown types.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    for (singular, plural) in KIND_PLURALS {
        if *singular == lower {
            return (*plural).to_string();
        }
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

// =============================================================================
// Finalizers
// =============================================================================

/// True if the object carries the finalizer
pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .map(|f| f.iter().any(|s| s == finalizer))
        .unwrap_or(false)
}

/// Add a finalizer to the list; returns false when it was already present.
///
/// Finalizers are a set: adding twice leaves exactly one entry.
pub fn add_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    let finalizers = meta.finalizers.get_or_insert_with(Vec::new);
    if finalizers.iter().any(|s| s == finalizer) {
        return false;
    }
    finalizers.push(finalizer.to_string());
    true
}

/// Remove a finalizer from the list; returns false when it was not present.
pub fn remove_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|s| s != finalizer);
    finalizers.len() != before
}

// =============================================================================
// Object JSON for hooks
// =============================================================================

/// Reduce metadata to the identifying fields handed to hook templates.
///
/// Keeps name, namespace, uid, generation, labels, annotations and owner
/// references; drops server bookkeeping such as managedFields and
/// resourceVersion.
pub fn strip_meta_decorators(meta: &ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        name: meta.name.clone(),
        namespace: meta.namespace.clone(),
        uid: meta.uid.clone(),
        generation: meta.generation,
        labels: meta.labels.clone(),
        annotations: meta.annotations.clone(),
        owner_references: meta.owner_references.clone(),
        ..Default::default()
    }
}

/// Serialize an object for hook templates: trimmed metadata, no status.
pub fn object_json<K>(obj: &K) -> Result<String>
where
    K: kube::Resource + Serialize,
{
    let mut value = serde_json::to_value(obj)?;
    let meta = serde_json::to_value(strip_meta_decorators(obj.meta()))?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert("metadata".to_string(), meta);
            map.remove("status");
        }
        None => {
            return Err(Error::serialization_for_kind(
                "object",
                "object did not serialize to a JSON map",
            ))
        }
    }
    Ok(serde_json::to_string(&value)?)
}

// =============================================================================
// Hashing
// =============================================================================

/// Compute a deterministic hash of the input string, returning a 16-char hex digest.
///
/// Uses truncated SHA-256 so the value is stable across toolchains and can be
/// persisted in annotations.
pub fn deterministic_hash(input: &str) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()[..8]
        .iter()
        .fold(String::with_capacity(16), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Hash of a spec over its canonical JSON form (object keys sorted).
///
/// Arrays keep their order, so reordering a list such as batch members or
/// targets changes the hash.
pub fn spec_hash<T: Serialize>(spec: &T) -> Result<String> {
    let value = serde_json::to_value(spec)?;
    let canonical = canonicalize(value);
    Ok(deterministic_hash(&serde_json::to_string(&canonical)?))
}

fn canonicalize(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<String, serde_json::Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(canonicalize).collect())
        }
        other => other,
    }
}
