//! Resource Accessor for Greeting objects.
//!
//! `GreetingAccessor` abstracts the API server so the reconciler can be unit
//! tested without a cluster. `KubeGreetingAccessor` is the real implementation;
//! `MockGreetingAccessor` keeps objects in memory for tests.

#[cfg(test)]
mod mock;

#[cfg(test)]
pub use mock::MockGreetingAccessor;

use crate::error::AccessError;
use crate::key::ObjectKey;
use crds::Greeting;
use k8s_openapi::Resource as _;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::debug;

/// Typed get/update operations against a single Greeting.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait GreetingAccessor: Send + Sync {
    /// Reads the current object. `Ok(None)` means it does not exist.
    async fn get(&self, key: &ObjectKey) -> Result<Option<Greeting>, AccessError>;

    /// Writes `greeting.status` through the status subresource.
    ///
    /// The write is conditional on `greeting.metadata.resourceVersion`; a stale
    /// version yields `AccessError::Conflict`. The spec is never written.
    async fn update_status(&self, greeting: &Greeting) -> Result<(), AccessError>;
}

/// Accessor backed by the Kubernetes API server.
///
/// `kube::Client` is a pooled, cheaply cloned handle, so one accessor is
/// shared by all concurrent passes.
#[derive(Clone)]
pub struct KubeGreetingAccessor {
    client: Client,
}

impl KubeGreetingAccessor {
    /// Creates a new accessor instance.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Greeting> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl std::fmt::Debug for KubeGreetingAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeGreetingAccessor").finish_non_exhaustive()
    }
}

/// HTTP status code carried by an API error response, if any.
fn api_error_code(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

/// Maps a write failure onto the accessor contract.
fn classify_write_error(error: kube::Error) -> AccessError {
    match api_error_code(&error) {
        Some(404) => AccessError::NotFound,
        Some(409) => AccessError::Conflict,
        _ => AccessError::Kube(error),
    }
}

/// Builds the merge patch for a status write.
///
/// Carrying `metadata.resourceVersion` in the body makes the API server
/// reject the patch with 409 when the object changed since it was read.
pub(crate) fn status_patch(greeting: &Greeting) -> Result<serde_json::Value, AccessError> {
    let resource_version = greeting
        .metadata
        .resource_version
        .as_deref()
        .ok_or(AccessError::MissingResourceVersion)?;

    Ok(json!({
        "apiVersion": Greeting::API_VERSION,
        "kind": Greeting::KIND,
        "metadata": {
            "resourceVersion": resource_version,
        },
        "status": serde_json::to_value(greeting.status.clone().unwrap_or_default())?,
    }))
}

#[async_trait::async_trait]
impl GreetingAccessor for KubeGreetingAccessor {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Greeting>, AccessError> {
        let greeting = self.api(key.namespace()).get_opt(key.name()).await?;
        debug!(
            namespace = key.namespace(),
            name = key.name(),
            found = greeting.is_some(),
            "Fetched Greeting"
        );
        Ok(greeting)
    }

    async fn update_status(&self, greeting: &Greeting) -> Result<(), AccessError> {
        let name = greeting.metadata.name.as_deref().ok_or(AccessError::NotFound)?;
        let namespace = greeting.metadata.namespace.as_deref().ok_or(AccessError::NotFound)?;
        let patch = status_patch(greeting)?;

        self.api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(classify_write_error)?;

        Ok(())
    }
}
