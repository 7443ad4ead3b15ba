//! Daemon bootstrap: configuration, telemetry, then the bus connection.

use std::sync::Arc;

use dbus::channel::Channel;
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use hcid_config::Config;

use crate::bus::{self, BusError};
use crate::daemon::Daemon;
use crate::driver::AdapterDriver;
use crate::health::HealthReporter;
use crate::reactor::Reactor;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The message bus could not be reached.
    #[error("failed to connect to the message bus: {source}")]
    Bus {
        /// Underlying bus error.
        #[source]
        source: BusError,
    },
}

/// Configuration and telemetry are in place; the bus is not yet connected.
pub struct Bootstrapped {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Bootstrapped {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Connects to the configured bus endpoint and builds the daemon.
    pub fn connect<R, D>(
        self,
        driver: D,
        reactor: R,
    ) -> Result<Daemon<Channel, R, D>, BootstrapError>
    where
        R: Reactor,
        D: AdapterDriver,
    {
        let endpoint = self.config.bus_endpoint();
        let daemon = bus::connect(endpoint).and_then(|channel| {
            Daemon::new(&self.config, driver, channel, reactor, Arc::clone(&self.reporter))
        });
        match daemon {
            Ok(daemon) => {
                self.reporter.bus_connected(endpoint);
                Ok(daemon)
            }
            Err(source) => {
                let error = BootstrapError::Bus { source };
                self.reporter.bootstrap_failed(&error);
                Err(error)
            }
        }
    }
}

/// Loads configuration and installs telemetry, reporting each step.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Bootstrapped, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);
    Ok(Bootstrapped {
        config,
        telemetry,
        reporter,
    })
}
