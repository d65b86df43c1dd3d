//! Error types for the Stash orchestrator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the identity of the object involved so that a
//! controller can decide whether to requeue without parsing messages.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Stash operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error that is neither NotFound nor Conflict
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The requested invoker or session does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind (e.g., BackupSession)
        kind: String,
        /// Resource name
        name: String,
        /// Resource namespace
        namespace: String,
    },

    /// Optimistic-concurrency write collision
    #[error("conflict writing {kind} {name}: object was modified concurrently")]
    Conflict {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Whether the caller asked to refetch and retry on this conflict
        retryable: bool,
    },

    /// Malformed or incompatible configuration
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.schedule")
        field: Option<String>,
    },

    /// Invoker or session kind outside the four known variants
    #[error("unknown invoker kind: {kind}")]
    UnknownKind {
        /// The kind that was requested
        kind: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Failure while deleting artifacts during retention cleanup
    #[error("retention error: {message}")]
    Retention {
        /// Description of what failed
        message: String,
        /// Artifact that could not be removed (if known)
        snapshot: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "status-store", "invoker")
        context: String,
    },
}

impl Error {
    /// Classify a kube error for a specific object.
    ///
    /// HTTP 404 becomes [`Error::NotFound`], HTTP 409 becomes a retryable
    /// [`Error::Conflict`], anything else is kept as [`Error::Kube`].
    pub fn from_kube(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        err: kube::Error,
    ) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 404 => Self::not_found(kind, namespace, name),
            kube::Error::Api(ae) if ae.code == 409 => Self::conflict(kind, name),
            _ => Self::Kube { source: err },
        }
    }

    /// Create a NotFound error
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Create a retryable conflict error
    pub fn conflict(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            retryable: true,
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with resource context and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an unknown-kind error
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        Self::UnknownKind { kind: kind.into() }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a retention error for a specific snapshot
    pub fn retention_for(snapshot: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Retention {
            message: msg.into(),
            snapshot: Some(snapshot.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Mark a conflict as final so retry helpers stop on it
    pub fn into_final_conflict(self) -> Self {
        match self {
            Error::Conflict { kind, name, .. } => Error::Conflict {
                kind,
                name,
                retryable: false,
            },
            other => other,
        }
    }

    /// True for NotFound errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True for conflict errors regardless of retryability
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// True only for conflicts the caller agreed to retry
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, Error::Conflict { retryable: true, .. })
    }

    /// Check if this error is retryable
    ///
    /// NotFound, validation, unknown-kind and serialization errors need an
    /// external change before another attempt can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::NotFound { .. } => false,
            Error::Conflict { retryable, .. } => *retryable,
            Error::Validation { .. } => false,
            Error::UnknownKind { .. } => false,
            Error::Serialization { .. } => false,
            Error::Retention { .. } => true,
            Error::Internal { .. } => true,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
            kind: None,
        }
    }
}
