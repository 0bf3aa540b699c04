//! Reconciliation logic for Greeting resources.
//!
//! One pass fetches the object, asks the convergence function what to do,
//! and applies the answer. Passes hold no state between runs; every pass
//! re-reads the object, and a resource-version conflict on write is an
//! expected outcome rather than a failure.

use crate::accessor::GreetingAccessor;
use crate::convergence::{Convergence, converge};
use crate::error::{AccessError, ControllerError};
use crate::key::ObjectKey;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span};

/// Cancellation and deadline budget for one pass.
#[derive(Debug, Clone)]
pub struct PassContext {
    cancel: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl PassContext {
    /// Starts the clock: the pass must finish within `timeout`.
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// Runs `operation` unless the pass is cancelled or out of time.
    ///
    /// Cancellation is checked first, so an already-cancelled pass never
    /// starts the operation.
    pub async fn guard<F: Future>(&self, operation: F) -> Result<F::Output, ControllerError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ControllerError::Cancelled),
            result = tokio::time::timeout_at(self.deadline, operation) => {
                result.map_err(|_elapsed| ControllerError::Timeout(self.timeout))
            }
        }
    }
}

/// Successful outcome of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Status was written and now matches the spec
    Converged,
    /// Status already matched; nothing was written
    NoOp,
    /// Object no longer exists; nothing to reconcile
    NotFound,
    /// Object changed after it was read; run again right away
    Conflict,
}

impl ReconcileOutcome {
    /// Whether the scheduler should run the pass again without backoff.
    pub fn requeue_immediately(self) -> bool {
        matches!(self, Self::Conflict)
    }

    /// Short, stable label used for logs and metrics.
    pub fn label(self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::NoOp => "noop",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
        }
    }
}

/// Host-facing entry point for one reconcile pass.
///
/// This is the only coupling between the core and the watch/retry loop: the
/// host calls it per object key and turns the result into a requeue decision.
#[async_trait::async_trait]
pub trait Reconcile: Send + Sync {
    /// Runs one pass for `key`.
    ///
    /// `Ok` covers every terminal state, including a conflict that asks for an
    /// immediate requeue. `Err` is reserved for transient failures,
    /// cancellation and timeouts, which the host retries with backoff.
    async fn reconcile(
        &self,
        ctx: &PassContext,
        key: &ObjectKey,
    ) -> Result<ReconcileOutcome, ControllerError>;
}

/// Reconciles Greeting resources.
pub struct Reconciler {
    accessor: Arc<dyn GreetingAccessor>,
    span: Span,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    ///
    /// Every pass is logged inside a `reconcile` span parented to `span`.
    pub fn new(accessor: Arc<dyn GreetingAccessor>, span: Span) -> Self {
        Self { accessor, span }
    }

    async fn reconcile_pass(
        &self,
        ctx: &PassContext,
        key: &ObjectKey,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let mut greeting = match ctx.guard(self.accessor.get(key)).await? {
            Ok(Some(greeting)) => greeting,
            Ok(None) | Err(AccessError::NotFound) => {
                debug!("Greeting no longer exists, nothing to reconcile");
                return Ok(ReconcileOutcome::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let status = match converge(&greeting) {
            Convergence::NoOp => {
                debug!(desired = greeting.desired_message(), "Greeting already converged");
                return Ok(ReconcileOutcome::NoOp);
            }
            Convergence::Converge(status) => status,
        };

        let observed_message = status.observed_message.clone();
        greeting.status = Some(status);

        match ctx.guard(self.accessor.update_status(&greeting)).await? {
            Ok(()) => {
                info!(observed_message = %observed_message, "Updated Greeting status");
                Ok(ReconcileOutcome::Converged)
            }
            Err(AccessError::Conflict) => {
                debug!("Greeting changed since it was read, requeueing");
                Ok(ReconcileOutcome::Conflict)
            }
            Err(AccessError::NotFound) => {
                debug!("Greeting deleted before its status could be written");
                Ok(ReconcileOutcome::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl Reconcile for Reconciler {
    async fn reconcile(
        &self,
        ctx: &PassContext,
        key: &ObjectKey,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let span = info_span!(
            parent: &self.span,
            "reconcile",
            namespace = key.namespace(),
            name = key.name(),
        );
        self.reconcile_pass(ctx, key).instrument(span).await
    }
}
