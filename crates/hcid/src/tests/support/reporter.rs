//! Health reporter double that records lifecycle events.

use std::sync::Mutex;

use hcid_config::{BusEndpoint, Config};

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    BusConnected(String),
    BusDisconnected,
    AdapterAttached(u16),
    AdapterDetached(u16),
}

#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn bus_connected(&self, endpoint: &BusEndpoint) {
        self.record(HealthEvent::BusConnected(endpoint.to_string()));
    }

    fn bus_disconnected(&self) {
        self.record(HealthEvent::BusDisconnected);
    }

    fn adapter_attached(&self, adapter: u16) {
        self.record(HealthEvent::AdapterAttached(adapter));
    }

    fn adapter_detached(&self, adapter: u16) {
        self.record(HealthEvent::AdapterDetached(adapter));
    }
}
