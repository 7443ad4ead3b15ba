//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use hcid_config::{BusEndpoint, Config};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the bus connection is established.
    fn bus_connected(&self, endpoint: &BusEndpoint);

    /// Invoked when the bus connection is lost.
    fn bus_disconnected(&self);

    /// Invoked after an adapter's endpoints are published.
    fn adapter_attached(&self, adapter: u16);

    /// Invoked after an adapter's endpoints are withdrawn.
    fn adapter_detached(&self, adapter: u16);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn bus_connected(&self, endpoint: &BusEndpoint) {
        (**self).bus_connected(endpoint);
    }

    fn bus_disconnected(&self) {
        (**self).bus_disconnected();
    }

    fn adapter_attached(&self, adapter: u16) {
        (**self).adapter_attached(adapter);
    }

    fn adapter_detached(&self, adapter: u16) {
        (**self).adapter_detached(adapter);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            bus = %config.bus_endpoint(),
            bus_name = config.bus_name(),
            log_filter = config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn bus_connected(&self, endpoint: &BusEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bus_connected",
            bus = %endpoint,
            "connected to message bus"
        );
    }

    fn bus_disconnected(&self) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "bus_disconnected",
            "message bus connection lost"
        );
    }

    fn adapter_attached(&self, adapter: u16) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "adapter_attached",
            adapter,
            "adapter endpoints published"
        );
    }

    fn adapter_detached(&self, adapter: u16) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "adapter_detached",
            adapter,
            "adapter endpoints withdrawn"
        );
    }
}
