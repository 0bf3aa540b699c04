//! Prometheus metrics for reconcile passes.
//!
//! Transient failures surface here as a retry count instead of crashing the
//! process. Served as text on `/metrics`.

use crate::error::ControllerError;
use crate::reconciler::ReconcileOutcome;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Reconcile metrics of one controller.
pub struct ReconcileMetrics {
    reconciliations: IntCounterVec,
    errors: IntCounterVec,
    retries: IntCounter,
    duration: Histogram,
}

impl ReconcileMetrics {
    /// Create metrics with names prefixed by `prefix` and register them.
    ///
    /// Registering the same prefix twice in one registry fails.
    pub fn new(prefix: &str, registry: &Registry) -> Result<Self, prometheus::Error> {
        let reconciliations = IntCounterVec::new(
            Opts::new(
                format!("{}_reconcile_total", prefix),
                "Completed reconcile passes by outcome",
            ),
            &["outcome"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new(
                format!("{}_reconcile_errors_total", prefix),
                "Failed reconcile passes by error kind",
            ),
            &["kind"],
        )?;
        let retries = IntCounter::new(
            format!("{}_reconcile_retries_total", prefix),
            "Reconcile passes requeued with backoff",
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new(
                format!("{}_reconcile_duration_seconds", prefix),
                "Duration of reconcile passes",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(retries.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            reconciliations,
            errors,
            retries,
            duration,
        })
    }

    /// Records a pass that returned an outcome.
    pub fn record_outcome(&self, outcome: ReconcileOutcome, elapsed: Duration) {
        self.reconciliations.with_label_values(&[outcome.label()]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    /// Records a pass that returned an error.
    pub fn record_error(&self, error: &ControllerError, elapsed: Duration) {
        self.errors.with_label_values(&[error.kind()]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    /// Records that a failed pass was scheduled for a retry.
    pub fn record_retry(&self) {
        self.retries.inc();
    }

    /// Total retries scheduled so far.
    #[cfg(test)]
    pub fn retry_count(&self) -> u64 {
        self.retries.get()
    }

    /// Passes recorded with `outcome`.
    #[cfg(test)]
    pub fn outcome_count(&self, outcome: ReconcileOutcome) -> u64 {
        self.reconciliations.with_label_values(&[outcome.label()]).get()
    }
}

/// Render every metric in `registry` in Prometheus text format
pub fn render(registry: &Registry) -> Result<String, ControllerError> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&registry.gather())?)
}

/// Router serving `/metrics`.
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

async fn metrics_handler(State(registry): State<Registry>) -> impl IntoResponse {
    match render(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            e.to_string(),
        ),
    }
}
