//! The wire underneath [`BusConnection`](super::BusConnection).

use std::os::fd::RawFd;
use std::time::Duration;

use dbus::Message;
use dbus::channel::{Channel, Sender};
use tracing::debug;

use hcid_config::BusEndpoint;

use super::errors::BusError;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bus");

/// Non-blocking message pipe to the bus daemon.
///
/// Sending only queues; bytes move when [`read_write`](Self::read_write) is
/// called after the descriptor reports readiness.
pub trait Transport {
    /// Descriptor the event loop polls.
    fn fd(&self) -> RawFd;

    /// `true` while queued messages wait to be written.
    fn wants_write(&self) -> bool;

    /// Moves pending bytes in both directions without blocking.
    fn read_write(&mut self) -> Result<(), BusError>;

    /// Takes the next fully received message.
    fn pop_message(&mut self) -> Option<Message>;

    /// Queues `message` and returns the serial it was assigned.
    fn send(&mut self, message: Message) -> Result<u32, BusError>;

    /// `false` once the bus has gone away.
    fn is_connected(&self) -> bool;
}

impl Transport for Channel {
    fn fd(&self) -> RawFd {
        self.watch().fd
    }

    fn wants_write(&self) -> bool {
        self.has_messages_to_send()
    }

    fn read_write(&mut self) -> Result<(), BusError> {
        Self::read_write(self, Some(Duration::ZERO)).map_err(|()| BusError::Disconnected)
    }

    fn pop_message(&mut self) -> Option<Message> {
        Self::pop_message(self)
    }

    fn send(&mut self, message: Message) -> Result<u32, BusError> {
        Sender::send(self, message).map_err(|()| BusError::Disconnected)
    }

    fn is_connected(&self) -> bool {
        Self::is_connected(self)
    }
}

/// Opens a private connection to `endpoint` and says hello to the bus.
///
/// The returned channel has watch tracking enabled so its descriptor can be
/// handed to a reactor.
pub fn connect(endpoint: &BusEndpoint) -> Result<Channel, BusError> {
    let address = endpoint.dbus_address();
    let connect_error = |source| BusError::Connect {
        endpoint: endpoint.to_string(),
        source,
    };
    let mut channel = Channel::open_private(&address).map_err(connect_error)?;
    channel.register().map_err(connect_error)?;
    channel.set_watch_enabled(true);
    debug!(target: TRANSPORT_TARGET, %address, "registered with bus");
    Ok(channel)
}
