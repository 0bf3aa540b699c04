//! Controller configuration.
//!
//! Loaded once at startup from environment variables. Any invalid value is a
//! startup error; nothing here is re-read while the controller runs.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration for the Greeting Controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Address of the Prometheus endpoint
    pub metrics_bind_address: SocketAddr,
    /// Address of the `/healthz` and `/readyz` endpoints
    pub health_probe_bind_address: SocketAddr,
    /// Deadline for one reconcile pass
    pub reconcile_timeout: Duration,
    /// Maximum concurrent passes across distinct objects
    pub concurrency: u16,
    /// Quiet period the scheduler waits for before running a pass
    pub debounce: Duration,
    /// First retry delay after a failed pass
    pub backoff_min: Duration,
    /// Largest retry delay after repeated failures
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            metrics_bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            health_probe_bind_address: SocketAddr::from(([0, 0, 0, 0], 8081)),
            reconcile_timeout: Duration::from_secs(30),
            concurrency: 3,
            debounce: Duration::from_millis(500),
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            metrics_bind_address: parse_or(&lookup, "METRICS_BIND_ADDRESS", defaults.metrics_bind_address)?,
            health_probe_bind_address: parse_or(
                &lookup,
                "HEALTH_PROBE_BIND_ADDRESS",
                defaults.health_probe_bind_address,
            )?,
            reconcile_timeout: parse_or(&lookup, "RECONCILE_TIMEOUT_SECS", defaults.reconcile_timeout.as_secs())
                .map(Duration::from_secs)?,
            concurrency: parse_or(&lookup, "RECONCILE_CONCURRENCY", defaults.concurrency)?,
            debounce: parse_or(&lookup, "RECONCILE_DEBOUNCE_MS", 500u64).map(Duration::from_millis)?,
            backoff_min: parse_or(&lookup, "BACKOFF_MIN_SECS", defaults.backoff_min.as_secs())
                .map(Duration::from_secs)?,
            backoff_max: parse_or(&lookup, "BACKOFF_MAX_SECS", defaults.backoff_max.as_secs())
                .map(Duration::from_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.reconcile_timeout.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be greater than zero".to_string(),
            ));
        }
        if self.backoff_min.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "BACKOFF_MIN_SECS must be greater than zero".to_string(),
            ));
        }
        if self.backoff_min > self.backoff_max {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_MIN_SECS ({}) must not exceed BACKOFF_MAX_SECS ({})",
                self.backoff_min.as_secs(),
                self.backoff_max.as_secs()
            )));
        }
        if self.metrics_bind_address == self.health_probe_bind_address {
            return Err(ControllerError::InvalidConfig(format!(
                "METRICS_BIND_ADDRESS and HEALTH_PROBE_BIND_ADDRESS are both {}",
                self.metrics_bind_address
            )));
        }
        Ok(())
    }

    /// Backoff derived from the configured bounds.
    pub fn backoff(&self) -> FibonacciBackoff {
        FibonacciBackoff::new(self.backoff_min, self.backoff_max)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ControllerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} = {:?}: {}", name, raw, e))
        }),
    }
}
