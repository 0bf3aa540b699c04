//! Greeting Controller
//!
//! Keeps `status.observedMessage` of every `Greeting` resource equal to its
//! `spec.message`. Each reconcile pass re-reads the object, writes the status
//! only when it differs, and relies on the resource version to detect
//! concurrent edits.

mod accessor;
mod backoff;
mod config;
mod controller;
mod convergence;
mod error;
mod health;
mod key;
mod metrics;
mod reconciler;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::controller::{Manager, register_greeting_controller};
use crate::error::ControllerError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's TLS stack needs a process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting Greeting Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Metrics address: {}", config.metrics_bind_address);
    info!("  Health probe address: {}", config.health_probe_bind_address);
    info!("  Reconcile timeout: {:?}", config.reconcile_timeout);
    info!("  Concurrency: {}, debounce: {:?}", config.concurrency, config.debounce);
    info!("  Backoff: {:?} to {:?}", config.backoff_min, config.backoff_max);

    let mut manager = Manager::new(config).await?;
    register_greeting_controller(&mut manager)?;
    manager.run().await?;

    Ok(())
}
