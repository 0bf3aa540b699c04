//! Convergence decision for a fetched Greeting.
//!
//! Pure: no I/O, no clock, no logging. The reconciler performs whatever the
//! decision asks for.

use crds::{Greeting, GreetingStatus};

/// What a pass must do to converge an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    /// Status already reflects the spec
    NoOp,
    /// Status must be replaced with this value
    Converge(GreetingStatus),
}

/// Compares `spec.message` with `status.observedMessage` byte for byte.
///
/// Missing spec or status fields read as the empty string.
pub fn converge(greeting: &Greeting) -> Convergence {
    let desired = greeting.desired_message();

    if desired == greeting.observed_message() {
        Convergence::NoOp
    } else {
        Convergence::Converge(GreetingStatus {
            observed_message: desired.to_string(),
        })
    }
}
