//! Layered configuration for the hcid bus front end.
//!
//! Values are merged from defaults, configuration files, `HCID_*`
//! environment variables, and command-line flags by [`ortho_config`]. The
//! daemon reads its bus endpoint, logging setup, and the time bounds applied
//! to slow controller and agent operations from the resolved [`Config`].

mod defaults;
mod endpoint;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_AGENT_TIMEOUT_MS, DEFAULT_BUS_NAME, DEFAULT_LOG_FILTER, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_REMOTE_NAME_TIMEOUT_MS, DEFAULT_ROLE_SWITCH_TIMEOUT_MS, DEFAULT_TCP_PORT,
    default_bus_endpoint,
};
pub use endpoint::{BusEndpoint, BusEndpointParseError};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "HCID")]
pub struct Config {
    /// Bus the daemon connects to.
    #[serde(default = "defaults::default_bus_endpoint")]
    #[ortho_config(default = defaults::default_bus_endpoint())]
    pub bus_endpoint: BusEndpoint,
    /// Well-known name requested once connected.
    #[serde(default = "defaults::default_bus_name")]
    #[ortho_config(default = defaults::default_bus_name())]
    pub bus_name: String,
    /// `tracing` filter expression.
    #[serde(default = "defaults::default_log_filter")]
    #[ortho_config(default = defaults::default_log_filter())]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// PIN agent reply bound in milliseconds.
    #[serde(default = "default_agent_timeout_ms")]
    #[ortho_config(default = DEFAULT_AGENT_TIMEOUT_MS)]
    pub agent_timeout_ms: u64,
    /// Remote name lookup bound in milliseconds.
    #[serde(default = "default_remote_name_timeout_ms")]
    #[ortho_config(default = DEFAULT_REMOTE_NAME_TIMEOUT_MS)]
    pub remote_name_timeout_ms: u64,
    /// Role switch bound in milliseconds.
    #[serde(default = "default_role_switch_timeout_ms")]
    #[ortho_config(default = DEFAULT_ROLE_SWITCH_TIMEOUT_MS)]
    pub role_switch_timeout_ms: u64,
    /// Maximum connection records returned per adapter.
    #[serde(default = "default_max_connections")]
    #[ortho_config(default = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u16,
}

const fn default_agent_timeout_ms() -> u64 {
    DEFAULT_AGENT_TIMEOUT_MS
}

const fn default_remote_name_timeout_ms() -> u64 {
    DEFAULT_REMOTE_NAME_TIMEOUT_MS
}

const fn default_role_switch_timeout_ms() -> u64 {
    DEFAULT_ROLE_SWITCH_TIMEOUT_MS
}

const fn default_max_connections() -> u16 {
    DEFAULT_MAX_CONNECTIONS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_endpoint: defaults::default_bus_endpoint(),
            bus_name: defaults::default_bus_name(),
            log_filter: defaults::default_log_filter(),
            log_format: defaults::default_log_format(),
            agent_timeout_ms: DEFAULT_AGENT_TIMEOUT_MS,
            remote_name_timeout_ms: DEFAULT_REMOTE_NAME_TIMEOUT_MS,
            role_switch_timeout_ms: DEFAULT_ROLE_SWITCH_TIMEOUT_MS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Config {
    /// Bus endpoint the daemon connects to.
    #[must_use]
    pub fn bus_endpoint(&self) -> &BusEndpoint {
        &self.bus_endpoint
    }

    /// Well-known bus name.
    #[must_use]
    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Bound on waiting for the PIN agent.
    #[must_use]
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    /// Bound on a remote name lookup.
    #[must_use]
    pub fn remote_name_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_name_timeout_ms)
    }

    /// Bound on a role switch.
    #[must_use]
    pub fn role_switch_timeout(&self) -> Duration {
        Duration::from_millis(self.role_switch_timeout_ms)
    }

    /// Maximum connection records returned per adapter.
    #[must_use]
    pub fn max_connections(&self) -> usize {
        usize::from(self.max_connections)
    }
}
