//! Process supervision: signal-driven shutdown and the launch sequence.

mod errors;
pub(crate) mod launch;
mod shutdown;

pub use errors::LaunchError;
pub use launch::run_daemon;
pub use shutdown::{ShutdownError, ShutdownPipe};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
