//! Test suites for the daemon.

pub(crate) mod support;
mod unit;
