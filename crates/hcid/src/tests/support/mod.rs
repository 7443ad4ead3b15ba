//! Doubles shared by unit and behaviour tests.

mod bus;
mod channel;
mod daemon;
mod driver;
mod reporter;

pub(crate) use bus::{BusPeer, LoopbackTransport, loopback, method_call};
pub(crate) use channel::RecordingChannel;
pub(crate) use daemon::DaemonHarness;
pub(crate) use driver::{RecordingDriver, RoleSwitch};
pub(crate) use reporter::{HealthEvent, RecordingHealthReporter};

/// Removes the quotes Gherkin places around step arguments.
pub(crate) fn strip_quotes(text: &str) -> &str {
    text.trim().trim_matches('"')
}
