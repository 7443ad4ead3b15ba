use thiserror::Error;

use super::watch::WatchError;

/// Errors raised by the bus transport.
#[derive(Debug, Error)]
pub enum BusError {
    /// Connecting or registering with the bus failed.
    #[error("failed to connect to bus at {endpoint}: {source}")]
    Connect {
        /// Endpoint that refused the connection.
        endpoint: String,
        /// Underlying libdbus error.
        #[source]
        source: dbus::Error,
    },
    /// A message could not be built from the supplied names.
    #[error("invalid bus message: {0}")]
    InvalidMessage(String),
    /// The connection has already been lost.
    #[error("bus connection is closed")]
    Disconnected,
    /// The event loop rejected a watch.
    #[error(transparent)]
    Watch(#[from] WatchError),
}
