//! Reconcile request keys.
//!
//! An `ObjectKey` is the only thing a reconcile pass receives from the
//! scheduler: the namespace and name of the object to converge.

use crate::error::ControllerError;
use kube::{Resource, ResourceExt};
use std::fmt;
use std::str::FromStr;

/// Namespace and name of a watched object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    namespace: String,
    name: String,
}

impl ObjectKey {
    /// Creates a key, rejecting empty components.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, ControllerError> {
        let namespace = namespace.into();
        let name = name.into();

        if namespace.is_empty() {
            return Err(ControllerError::InvalidKey(format!("{}: empty namespace", name)));
        }
        if name.is_empty() {
            return Err(ControllerError::InvalidKey(format!("{}/: empty name", namespace)));
        }

        Ok(Self { namespace, name })
    }

    /// Builds the key for a namespaced object delivered by the watch.
    pub fn from_resource<K: Resource>(obj: &K) -> Result<Self, ControllerError> {
        let namespace = obj.namespace().ok_or_else(|| {
            ControllerError::InvalidKey(format!("{} has no namespace", obj.name_any()))
        })?;
        Self::new(namespace, obj.name_any())
    }

    /// Namespace of the object.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the object.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = ControllerError;

    /// Parses `namespace/name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = s
            .split_once('/')
            .ok_or_else(|| ControllerError::InvalidKey(format!("{}: expected namespace/name", s)))?;
        if name.contains('/') {
            return Err(ControllerError::InvalidKey(format!("{}: too many segments", s)));
        }
        Self::new(namespace, name)
    }
}
