//! Greeting CRD Definitions
//!
//! Kubernetes custom resource types watched by the greeting controller.

pub mod greeting;

pub use greeting::*;
