//! Message-bus front end of the Bluetooth host-controller daemon.
//!
//! The daemon connects to a message bus, claims its well-known name, and
//! publishes one endpoint tree: a manager, a device-class endpoint, and a
//! controller endpoint per attached adapter plus a `default` alias while any
//! adapter is present. Inbound calls are routed through per-interface method
//! tables to handlers that drive the adapter through the [`AdapterDriver`]
//! seam. Controller PIN requests are forwarded to an external agent and
//! correlated with its replies.
//!
//! Everything runs on a single thread. The bus connection exposes readiness
//! watches that the [`ReactorBridge`] maps onto a [`Reactor`]; the daemon turns
//! that reactor until a termination signal arrives or the bus goes away.

pub mod agent;
mod bootstrap;
pub mod bus;
pub mod catalog;
mod daemon;
pub mod dispatch;
pub mod driver;
mod health;
pub mod lifecycle;
mod process;
pub mod reactor;
pub mod registry;
pub mod signals;
mod telemetry;

pub use bootstrap::{
    BootstrapError, Bootstrapped, ConfigLoader, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use daemon::{Daemon, HostEvent};
pub use driver::AdapterDriver;
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownError, ShutdownPipe, run_daemon};
pub use reactor::{PollReactor, Reactor, ReactorBridge};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
