//! Controller manager.
//!
//! The `Manager` owns the process-wide pieces shared by every registered
//! controller: the Kubernetes client, the metrics registry, the health checks
//! and the root shutdown token. Controllers register a watch future on it;
//! `run` serves the probe and metrics endpoints and drives the watches until
//! shutdown or until any watch exits.

use crate::accessor::KubeGreetingAccessor;
use crate::backoff::RetryTracker;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::health::{self, HealthChecks};
use crate::metrics::{self, ReconcileMetrics};
use crate::reconciler::Reconciler;
use crate::watcher::{WatchContext, watch_greetings};
use crds::Greeting;
use futures::future::BoxFuture;
use kube::{Api, Client};
use prometheus::Registry;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span};

/// Name the Greeting controller registers under.
pub const GREETING_CONTROLLER: &str = "greeting";

type ControllerFuture = BoxFuture<'static, Result<(), ControllerError>>;

/// Host for registered controllers.
pub struct Manager {
    client: Client,
    config: ControllerConfig,
    health: HealthChecks,
    registry: Registry,
    shutdown: CancellationToken,
    controllers: Vec<(String, ControllerFuture)>,
}

impl Manager {
    /// Creates a manager using the default in-cluster or kubeconfig client.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        let client = Client::try_default().await?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a manager around an existing client.
    pub fn with_client(client: Client, config: ControllerConfig) -> Self {
        Self {
            client,
            config,
            health: HealthChecks::new(),
            registry: Registry::new(),
            shutdown: CancellationToken::new(),
            controllers: Vec::new(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthChecks {
        &self.health
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Root token; cancelling it stops every controller and in-flight pass.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Adds a controller future under `name`.
    pub fn add_controller(&mut self, name: &str, controller: ControllerFuture) -> Result<(), ControllerError> {
        if self.controllers.iter().any(|(existing, _)| existing == name) {
            return Err(ControllerError::DuplicateRegistration(format!(
                "controller {} already registered",
                name
            )));
        }
        self.controllers.push((name.to_string(), controller));
        Ok(())
    }

    /// Names of registered controllers, in registration order.
    #[cfg(test)]
    pub fn controller_names(&self) -> Vec<&str> {
        self.controllers.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Runs every registered controller until Ctrl-C or until one exits.
    pub async fn run(self) -> Result<(), ControllerError> {
        if self.controllers.is_empty() {
            return Err(ControllerError::InvalidConfig("no controllers registered".to_string()));
        }

        let health_server = tokio::spawn(health::serve(
            "health",
            self.config.health_probe_bind_address,
            health::router(self.health.clone()),
            self.shutdown.clone(),
        ));
        let metrics_server = tokio::spawn(health::serve(
            "metrics",
            self.config.metrics_bind_address,
            metrics::router(self.registry.clone()),
            self.shutdown.clone(),
        ));

        let mut tasks = JoinSet::new();
        for (name, controller) in self.controllers {
            info!(controller = %name, "Starting controller");
            tasks.spawn(async move { (name, controller.await) });
        }

        let result = tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    info!("Received shutdown signal");
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for shutdown signal");
                    Err(e.into())
                }
            },
            Some(joined) = tasks.join_next() => controller_exit(joined),
        };

        self.shutdown.cancel();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = controller_exit(joined) {
                error!(error = %e, "Controller failed during shutdown");
            }
        }
        for server in [health_server, metrics_server] {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Server failed"),
                Err(e) => error!(error = %e, "Server task failed"),
            }
        }

        info!("Controller manager stopped");
        result
    }
}

/// Logs how a controller task ended and turns it into the manager's result.
fn controller_exit(
    joined: Result<(String, Result<(), ControllerError>), JoinError>,
) -> Result<(), ControllerError> {
    match joined {
        Ok((name, Ok(()))) => {
            info!(controller = %name, "Controller exited");
            Ok(())
        }
        Ok((name, Err(e))) => {
            error!(controller = %name, error = %e, "Controller failed");
            Err(e)
        }
        Err(e) => {
            error!(error = %e, "Controller task panicked");
            Err(ControllerError::Watch(format!("controller task failed: {}", e)))
        }
    }
}

/// Registers the Greeting reconciler with `manager`.
///
/// Watches `WATCH_NAMESPACE` when set and every namespace otherwise, and arms a
/// health check named after the controller. Registering twice is an error.
pub fn register_greeting_controller(manager: &mut Manager) -> Result<(), ControllerError> {
    let probe = manager.health().register(GREETING_CONTROLLER)?;
    let metrics = Arc::new(ReconcileMetrics::new(GREETING_CONTROLLER, manager.registry())?);

    let client = manager.client().clone();
    let config = manager.config().clone();
    let api: Api<Greeting> = match config.namespace.as_deref() {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let reconciler = Reconciler::new(
        Arc::new(KubeGreetingAccessor::new(client)),
        info_span!("controller", name = GREETING_CONTROLLER),
    );
    let ctx = Arc::new(WatchContext::new(
        Arc::new(reconciler),
        RetryTracker::new(config.backoff()),
        metrics,
        config.reconcile_timeout,
        manager.shutdown_token(),
    ));

    info!(
        controller = GREETING_CONTROLLER,
        namespace = config.namespace.as_deref().unwrap_or("all namespaces"),
        "Registering controller"
    );
    manager.add_controller(
        GREETING_CONTROLLER,
        Box::pin(async move { watch_greetings(api, ctx, &config, probe).await }),
    )
}
