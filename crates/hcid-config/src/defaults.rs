use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

use crate::endpoint::BusEndpoint;
use crate::logging::LogFormat;

/// Default TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 7433;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Well-known name the daemon claims on the bus.
pub const DEFAULT_BUS_NAME: &str = "org.bluez";

/// Upper bound on the PIN agent round trip.
pub const DEFAULT_AGENT_TIMEOUT_MS: u64 = 30_000;

/// Upper bound on a remote name lookup.
pub const DEFAULT_REMOTE_NAME_TIMEOUT_MS: u64 = 25_000;

/// Upper bound on a role switch request.
pub const DEFAULT_ROLE_SWITCH_TIMEOUT_MS: u64 = 10_000;

/// Maximum number of connection records reported per adapter.
pub const DEFAULT_MAX_CONNECTIONS: u16 = 10;

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Owned bus name used where allocation is required.
#[must_use]
pub fn default_bus_name() -> String {
    DEFAULT_BUS_NAME.to_owned()
}

/// Default logging format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the default bus endpoint.
#[must_use]
pub fn default_bus_endpoint() -> BusEndpoint {
    default_bus_endpoint_inner()
}

#[cfg(unix)]
fn default_bus_endpoint_inner() -> BusEndpoint {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("hcid");
    if apply_namespace {
        base.push(user_namespace());
    }

    BusEndpoint::unix(base.join("bus.sock"))
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(unix)]
fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_bus_endpoint_inner() -> BusEndpoint {
    BusEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_lives_under_hcid_directory() {
        let endpoint = default_bus_endpoint();
        let path = endpoint.unix_path().expect("unix endpoint by default");
        assert_eq!(path.file_name(), Some("bus.sock"));
        assert!(path.as_str().contains("/hcid"), "unexpected path {path}");
    }
}
