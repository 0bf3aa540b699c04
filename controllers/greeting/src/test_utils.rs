//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::accessor::MockGreetingAccessor;
use crate::error::AccessError;
use crate::reconciler::{PassContext, Reconciler};
use crds::{Greeting, GreetingSpec, GreetingStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Helper to create a test Greeting
///
/// `observed` of `None` leaves the status unset, as on a freshly created object.
pub fn create_test_greeting(
    namespace: &str,
    name: &str,
    message: &str,
    observed: Option<&str>,
) -> Greeting {
    Greeting {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        status: observed.map(|observed| GreetingStatus {
            observed_message: observed.to_string(),
        }),
        ..Greeting::new(name, GreetingSpec { message: message.to_string() })
    }
}

/// Helper to create a reconciler over a mock accessor
pub fn create_test_reconciler(accessor: &MockGreetingAccessor) -> Reconciler {
    Reconciler::new(Arc::new(accessor.clone()), tracing::Span::none())
}

/// Helper to create a pass context with a generous deadline
pub fn create_test_pass() -> PassContext {
    PassContext::new(CancellationToken::new(), Duration::from_secs(30))
}

/// Helper to create the error a failed API read reports: an undecodable body
pub fn transient_error() -> AccessError {
    let decode = serde_json::from_str::<serde_json::Value>("{\"kind\":").expect_err("truncated JSON");
    AccessError::Kube(kube::Error::SerdeError(decode))
}
