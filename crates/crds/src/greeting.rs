//! Greeting resource
//!
//! Declares a message in `spec.message`; the controller mirrors it into
//! `status.observedMessage` once it has been observed.
//!
//! The type implements the `k8s-openapi` `Resource`/`Metadata` traits by hand
//! instead of using the `CustomResource` derive: the derive requires `spec` to
//! be present, while a `Greeting` without a spec must still decode (its
//! desired message is the empty string).

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// API group of the Greeting resource
pub const GREETING_GROUP: &str = "example.com";

/// API version of the Greeting resource
pub const GREETING_VERSION: &str = "v1";

/// Kind of the Greeting resource
pub const GREETING_KIND: &str = "Greeting";

/// A namespaced Greeting object as stored by the API server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Greeting {
    /// Always `example.com/v1` when written by this crate
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Always `Greeting` when written by this crate
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Desired state; absent on the wire means "no message declared yet"
    #[serde(default)]
    pub spec: GreetingSpec,

    /// Observed state, written only through the status subresource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GreetingStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
/// Desired state of a Greeting
pub struct GreetingSpec {
    /// Message the user wants observed
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
/// Observed state of a Greeting
pub struct GreetingStatus {
    /// Last message the controller converged to
    #[serde(default)]
    pub observed_message: String,
}

fn default_api_version() -> String {
    <Greeting as k8s_openapi::Resource>::API_VERSION.to_string()
}

fn default_kind() -> String {
    GREETING_KIND.to_string()
}

impl Greeting {
    /// Creates a Greeting with the given name and spec and no status.
    pub fn new(name: &str, spec: GreetingSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    /// The declared message.
    pub fn desired_message(&self) -> &str {
        &self.spec.message
    }

    /// The message last written to status, empty if status was never written.
    pub fn observed_message(&self) -> &str {
        self.status
            .as_ref()
            .map_or("", |status| status.observed_message.as_str())
    }
}

impl k8s_openapi::Resource for Greeting {
    const API_VERSION: &'static str = "example.com/v1";
    const GROUP: &'static str = GREETING_GROUP;
    const KIND: &'static str = GREETING_KIND;
    const VERSION: &'static str = GREETING_VERSION;
    const URL_PATH_SEGMENT: &'static str = "greetings";
    type Scope = k8s_openapi::NamespaceResourceScope;
}

impl k8s_openapi::Metadata for Greeting {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_full_object() {
        let greeting: Greeting = serde_json::from_value(json!({
            "apiVersion": "example.com/v1",
            "kind": "Greeting",
            "metadata": { "name": "hello", "namespace": "default", "resourceVersion": "7" },
            "spec": { "message": "hi" },
            "status": { "observedMessage": "hello" }
        }))
        .expect("valid greeting");

        assert_eq!(greeting.desired_message(), "hi");
        assert_eq!(greeting.observed_message(), "hello");
        assert_eq!(greeting.metadata.resource_version.as_deref(), Some("7"));
    }

    #[test]
    fn test_missing_spec_defaults_to_empty_message() {
        let greeting: Greeting = serde_json::from_value(json!({
            "apiVersion": "example.com/v1",
            "kind": "Greeting",
            "metadata": { "name": "hello", "namespace": "default" }
        }))
        .expect("spec is optional");

        assert_eq!(greeting.desired_message(), "");
        assert_eq!(greeting.observed_message(), "");
        assert!(greeting.status.is_none());
    }

    #[test]
    fn test_missing_message_and_observed_message_default_to_empty() {
        let greeting: Greeting = serde_json::from_value(json!({
            "metadata": { "name": "hello" },
            "spec": {},
            "status": {}
        }))
        .expect("fields are optional");

        assert_eq!(greeting.desired_message(), "");
        assert_eq!(greeting.observed_message(), "");
        assert_eq!(greeting.api_version, "example.com/v1");
        assert_eq!(greeting.kind, "Greeting");
    }

    #[test]
    fn test_wrong_field_type_is_rejected() {
        let result = serde_json::from_value::<Greeting>(json!({
            "metadata": { "name": "hello" },
            "spec": { "message": 42 }
        }));
        assert!(result.is_err(), "non-string message must fail to decode");
    }

    #[test]
    fn test_serializes_camel_case_status() {
        let mut greeting = Greeting::new("hello", GreetingSpec { message: "hi".to_string() });
        greeting.status = Some(GreetingStatus { observed_message: "hi".to_string() });

        let value = serde_json::to_value(&greeting).expect("serializable");
        assert_eq!(value["apiVersion"], "example.com/v1");
        assert_eq!(value["kind"], "Greeting");
        assert_eq!(value["status"]["observedMessage"], "hi");
        assert!(value["status"].get("observed_message").is_none());
    }

    #[test]
    fn test_decoded_object_equals_constructed_object() {
        let decoded: Greeting = serde_json::from_value(json!({
            "metadata": { "name": "hello" },
            "spec": { "message": "hi" }
        }))
        .expect("valid greeting");

        assert_eq!(decoded, Greeting::new("hello", GreetingSpec { message: "hi".to_string() }));
        assert_ne!(decoded, Greeting::new("hello", GreetingSpec::default()));
    }

    #[test]
    fn test_kube_resource_metadata() {
        use kube::Resource;

        assert_eq!(Greeting::group(&()), "example.com");
        assert_eq!(Greeting::version(&()), "v1");
        assert_eq!(Greeting::kind(&()), "Greeting");
        assert_eq!(Greeting::plural(&()), "greetings");
    }
}
