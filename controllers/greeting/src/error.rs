//! Controller-specific error types.
//!
//! `AccessError` is the Resource Accessor contract: every failure a get or
//! status update can report. `ControllerError` is what a reconcile pass (and
//! startup) returns to its caller.

use std::time::Duration;
use thiserror::Error;
use kube::Error as KubeError;

/// Failures reported by a Resource Accessor.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Object does not exist (deleted before or during the pass)
    #[error("object not found")]
    NotFound,

    /// Resource version on the write no longer matches the stored object
    #[error("object was modified concurrently (resource version conflict)")]
    Conflict,

    /// Object carries no resource version, so an optimistic write is impossible
    #[error("object has no resourceVersion; refusing an unconditional status write")]
    MissingResourceVersion,

    /// Kubernetes API or transport error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Patch body could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur in the Greeting Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client construction or API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Resource Accessor failure that the scheduler should retry with backoff
    #[error("Resource access failed: {0}")]
    Access(#[from] AccessError),

    /// Pass was cancelled before it finished
    #[error("Reconcile pass cancelled")]
    Cancelled,

    /// Pass exceeded its deadline
    #[error("Reconcile pass exceeded its {0:?} deadline")]
    Timeout(Duration),

    /// Reconcile request does not name a valid object
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A controller or health check was registered twice
    #[error("Duplicate registration: {0}")]
    DuplicateRegistration(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Listener I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ControllerError {
    /// Errors that indicate a bug or misconfiguration rather than a runtime
    /// condition. Retrying them cannot succeed.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey(_)
                | Self::InvalidConfig(_)
                | Self::DuplicateRegistration(_)
                | Self::Access(AccessError::MissingResourceVersion)
        )
    }

    /// Short, stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Access(AccessError::MissingResourceVersion) => "missing_resource_version",
            Self::Kube(_) | Self::Access(_) => "transient",
            Self::Cancelled => "cancelled",
            Self::Timeout(_) => "timeout",
            Self::InvalidKey(_) => "invalid_key",
            Self::InvalidConfig(_) => "invalid_config",
            Self::DuplicateRegistration(_) => "duplicate_registration",
            Self::Watch(_) => "watch",
            Self::Io(_) => "io",
            Self::Metrics(_) => "metrics",
        }
    }
}
