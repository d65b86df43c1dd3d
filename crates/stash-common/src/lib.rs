//! Common types for Stash: CRDs, the condition ledger, errors and utilities

#![deny(missing_docs)]

pub mod conditions;
pub mod crd;
pub mod duration;
pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod target;
#[cfg(test)]
mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of every Stash custom resource
pub const STASH_API_GROUP: &str = "stash.appscode.com";

/// API version of the Stash v1beta1 resources
pub const STASH_API_VERSION: &str = "stash.appscode.com/v1beta1";

/// Finalizer placed on invokers so that owned resources are torn down before deletion
pub const STASH_FINALIZER: &str = "stash.appscode.com";

/// Field manager used for every write issued by this workspace
pub const FIELD_MANAGER: &str = "stash-operator";

/// Label carrying the kind of the invoker that created a session
pub const LABEL_INVOKER_TYPE: &str = "stash.appscode.com/invoker-type";

/// Label carrying the name of the invoker that created a session
pub const LABEL_INVOKER_NAME: &str = "stash.appscode.com/invoker-name";

/// Label carrying the kind of the backup target
pub const LABEL_TARGET_KIND: &str = "stash.appscode.com/target-kind";

/// Label carrying the name of the backup target
pub const LABEL_TARGET_NAME: &str = "stash.appscode.com/target-name";

/// Label carrying the namespace of the backup target
pub const LABEL_TARGET_NAMESPACE: &str = "stash.appscode.com/target-namespace";
