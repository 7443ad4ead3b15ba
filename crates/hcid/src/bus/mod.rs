//! Message bus plumbing over libdbus.
//!
//! Messages are [`dbus::Message`] values. The connection is single-threaded
//! and readiness driven: it never blocks, exposes its descriptor through
//! [`Watch`] values, and leaves polling to whichever [`WatchRegistrar`] the
//! daemon installs. The wire itself sits behind [`Transport`], which the
//! libdbus [`Channel`](dbus::channel::Channel) implements.

mod connection;
mod errors;
mod path;
mod transport;
mod watch;

pub use connection::{BusConnection, BusHandler, CallOutcome, DispatchStatus};
pub use dbus::Message;
pub use dbus::message::MessageType;
pub use errors::BusError;
pub use path::{ObjectPath, PathError};
pub use transport::{Transport, connect};
pub use watch::{Watch, WatchError, WatchFlags, WatchId, WatchRegistrar};

/// Name of the bus daemon itself.
pub const BUS_SERVICE: &str = "org.freedesktop.DBus";
/// Object path of the bus daemon.
pub const BUS_PATH: &str = "/org/freedesktop/DBus";
/// Interface of the bus daemon.
pub const BUS_INTERFACE: &str = "org.freedesktop.DBus";
/// Interface of signals raised locally by the connection.
pub const LOCAL_INTERFACE: &str = "org.freedesktop.DBus.Local";
/// Path of signals raised locally by the connection.
pub const LOCAL_PATH: &str = "/org/freedesktop/DBus/Local";
/// Error name for calls that timed out.
pub const ERROR_NO_REPLY: &str = "org.freedesktop.DBus.Error.NoReply";
/// Error name for calls nobody handled.
pub const ERROR_UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";

/// Full type signature of a message body, as libdbus reports it.
///
/// dbus 0.9 only exposes per-argument signatures, so this concatenates the
/// signature of every top-level argument.
pub trait MessageSignature {
    /// The concatenated signature of all arguments in the body.
    fn signature(&self) -> String;
}

impl MessageSignature for Message {
    fn signature(&self) -> String {
        let mut iter = self.iter_init();
        let mut signature = String::new();
        while iter.arg_type() != dbus::arg::ArgType::Invalid {
            signature.push_str(&iter.signature());
            iter.next();
        }
        signature
    }
}

/// Returns `true` when `message` is the signal `interface.member`.
#[must_use]
pub fn is_signal(message: &Message, interface: &str, member: &str) -> bool {
    message.msg_type() == MessageType::Signal
        && message.interface().is_some_and(|name| &*name == interface)
        && message.member().is_some_and(|name| &*name == member)
}
