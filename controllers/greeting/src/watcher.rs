//! Greeting resource watcher.
//!
//! Runs a `kube_runtime::Controller` over the Greeting kind and feeds every
//! event into the `Reconcile` trait. The controller handles reconnection,
//! debouncing and deduplication; this module maps pass results onto requeue
//! decisions.

use crate::backoff::RetryTracker;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::health::ProbeHandle;
use crate::key::ObjectKey;
use crate::metrics::ReconcileMetrics;
use crate::reconciler::{PassContext, Reconcile, ReconcileOutcome};
use crds::Greeting;
use futures::StreamExt;
use kube::Api;
use kube::api::ListParams;
use kube_runtime::controller::{self, Action, Config as SchedulerConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared state handed to every reconcile and error-policy invocation.
pub struct WatchContext {
    reconciler: Arc<dyn Reconcile>,
    retries: RetryTracker,
    metrics: Arc<ReconcileMetrics>,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl WatchContext {
    pub fn new(
        reconciler: Arc<dyn Reconcile>,
        retries: RetryTracker,
        metrics: Arc<ReconcileMetrics>,
        timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            retries,
            metrics,
            timeout,
            shutdown,
        }
    }
}

/// Requeue decision for a pass that finished without an error.
pub fn action_for_outcome(outcome: ReconcileOutcome) -> Action {
    if outcome.requeue_immediately() {
        Action::requeue(Duration::ZERO)
    } else {
        Action::await_change()
    }
}

/// Runs one pass for `greeting` and records its result.
pub async fn reconcile_greeting(
    greeting: Arc<Greeting>,
    ctx: Arc<WatchContext>,
) -> Result<Action, ControllerError> {
    let key = ObjectKey::from_resource(greeting.as_ref())?;
    let pass = PassContext::new(ctx.shutdown.child_token(), ctx.timeout);
    let started = Instant::now();

    match ctx.reconciler.reconcile(&pass, &key).await {
        Ok(outcome) => {
            ctx.metrics.record_outcome(outcome, started.elapsed());
            let failures = ctx.retries.error_count(&key);
            if failures > 0 {
                info!(key = %key, failures, "Reconcile pass recovered");
                ctx.retries.reset(&key);
            }
            debug!(key = %key, outcome = outcome.label(), "Reconcile pass finished");
            Ok(action_for_outcome(outcome))
        }
        Err(e) => {
            ctx.metrics.record_error(&e, started.elapsed());
            Err(e)
        }
    }
}

/// Requeue decision for a pass that returned an error.
///
/// Programming errors are not retried. Everything else backs off by the
/// object's consecutive error count.
pub fn error_policy(greeting: Arc<Greeting>, error: &ControllerError, ctx: Arc<WatchContext>) -> Action {
    if error.is_programming_error() {
        error!(error = %error, "Reconcile request cannot succeed, not retrying");
        return Action::await_change();
    }

    let key = match ObjectKey::from_resource(greeting.as_ref()) {
        Ok(key) => key,
        Err(e) => {
            error!(error = %e, "Reconcile request cannot succeed, not retrying");
            return Action::await_change();
        }
    };

    let (retries, delay) = ctx.retries.record_failure(&key);
    ctx.metrics.record_retry();
    warn!(
        key = %key,
        error = %error,
        retries,
        delay_secs = delay.as_secs(),
        "Reconcile pass failed, retrying with backoff"
    );
    Action::requeue(delay)
}

type ControllerEvent = Result<(ObjectRef<Greeting>, Action), controller::Error<ControllerError, watcher::Error>>;

/// Logs one item of the controller stream and arms `readiness` once objects flow.
///
/// Reconciler failures were already logged by `error_policy`; anything else
/// means the watch itself is failing.
pub fn observe_event(readiness: &ProbeHandle, event: &ControllerEvent) {
    match event {
        Ok((object, _action)) => {
            readiness.arm();
            debug!(object = %object, "Reconciled");
        }
        Err(controller::Error::ReconcilerFailed(_, object)) => {
            readiness.arm();
            debug!(object = %object, "Reconcile failed");
        }
        Err(controller::Error::ObjectNotFound(object)) => {
            debug!(object = %object, "Object gone before its reconcile ran");
        }
        Err(e) => error!(error = %e, "Greeting watch failed"),
    }
}

/// Watches Greeting resources until the watch ends or `ctx` shuts down.
///
/// `readiness` is armed once an initial list succeeds, so missing RBAC or a
/// missing CRD fails the watch instead of reporting ready. It is stopped when
/// the watch exits.
pub async fn watch_greetings(
    api: Api<Greeting>,
    ctx: Arc<WatchContext>,
    config: &ControllerConfig,
    readiness: ProbeHandle,
) -> Result<(), ControllerError> {
    info!(
        concurrency = config.concurrency,
        debounce = ?config.debounce,
        "Starting Greeting watcher"
    );

    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!(error = %e, "Cannot list Greeting resources");
        readiness.stop();
        return Err(ControllerError::Watch(format!("initial Greeting list failed: {}", e)));
    }
    readiness.arm();

    let scheduler_config = SchedulerConfig::default()
        .debounce(config.debounce)
        .concurrency(config.concurrency);
    let shutdown = ctx.shutdown.clone();

    let events = Controller::new(api, watcher::Config::default())
        .with_config(scheduler_config)
        .shutdown_on_signal()
        .run(reconcile_greeting, error_policy, ctx)
        .for_each(|event| {
            observe_event(&readiness, &event);
            futures::future::ready(())
        });

    tokio::select! {
        () = events => info!("Greeting watcher stream ended"),
        () = shutdown.cancelled() => info!("Greeting watcher shutting down"),
    }
    readiness.stop();

    Ok(())
}
