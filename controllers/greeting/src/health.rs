//! Liveness and readiness probes.
//!
//! Each registered controller owns a `ProbeHandle` that it arms once its watch
//! is running and marks stopped when the watch exits.
//!
//! - `/healthz` fails once any watch has stopped.
//! - `/readyz` succeeds only while every registered watch is running.

use crate::error::ControllerError;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;

const PENDING: u8 = 0;
const WATCHING: u8 = 1;
const STOPPED: u8 = 2;

/// State of one controller's watch, shared with the probe endpoints.
#[derive(Debug, Clone, Default)]
pub struct ProbeHandle(Arc<AtomicU8>);

impl ProbeHandle {
    /// The watch is running.
    pub fn arm(&self) {
        self.0.store(WATCHING, Ordering::SeqCst);
    }

    /// The watch has exited and will not restart.
    pub fn stop(&self) {
        self.0.store(STOPPED, Ordering::SeqCst);
    }

    /// Whether the watch is running.
    pub fn is_watching(&self) -> bool {
        self.0.load(Ordering::SeqCst) == WATCHING
    }

    /// Whether the watch has exited.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst) == STOPPED
    }

    fn state_label(&self) -> &'static str {
        match self.0.load(Ordering::SeqCst) {
            PENDING => "pending",
            WATCHING => "watching",
            _ => "stopped",
        }
    }
}

/// Named health checks of all registered controllers.
#[derive(Debug, Clone, Default)]
pub struct HealthChecks {
    checks: Arc<DashMap<String, ProbeHandle>>,
}

impl HealthChecks {
    /// Creates an empty set of checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a check; a second registration under the same name is an error.
    pub fn register(&self, name: &str) -> Result<ProbeHandle, ControllerError> {
        match self.checks.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ControllerError::DuplicateRegistration(format!(
                "health check {} already registered",
                name
            ))),
            Entry::Vacant(entry) => {
                let handle = ProbeHandle::default();
                entry.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    /// No watch has stopped.
    pub fn is_live(&self) -> bool {
        self.checks.iter().all(|check| !check.value().is_stopped())
    }

    /// At least one check exists and every watch is running.
    pub fn is_ready(&self) -> bool {
        !self.checks.is_empty() && self.checks.iter().all(|check| check.value().is_watching())
    }

    /// `name=state` for every check, sorted by name.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .checks
            .iter()
            .map(|check| format!("{}={}", check.key(), check.value().state_label()))
            .collect();
        lines.sort();
        lines.join("\n")
    }
}

/// Router serving `/healthz` and `/readyz`.
pub fn router(checks: HealthChecks) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(checks)
}

async fn healthz_handler(State(checks): State<HealthChecks>) -> impl IntoResponse {
    if checks.is_live() {
        (StatusCode::OK, "ok".to_string())
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, checks.summary())
    }
}

async fn readyz_handler(State(checks): State<HealthChecks>) -> impl IntoResponse {
    if checks.is_ready() {
        (StatusCode::OK, "ok".to_string())
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, checks.summary())
    }
}

/// Serves `router` on `addr` until `shutdown` is cancelled.
pub async fn serve(
    name: &'static str,
    addr: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(server = name, %addr, "Listening");

    let app = router.layer(tower_http::trace::TraceLayer::new_for_http());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
