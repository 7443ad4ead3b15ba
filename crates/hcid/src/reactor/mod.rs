//! Readiness reactor seam and its bridge to bus watches.
//!
//! The connection only knows about [`Watch`](crate::bus::Watch) values; the
//! [`ReactorBridge`] turns those into descriptor registrations on a
//! [`Reactor`] and maps readiness back onto watch identifiers.

mod bridge;
mod poll;

use std::os::fd::RawFd;
use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

pub use bridge::{ReactorBridge, ReadyEvent};
pub use poll::PollReactor;

/// Handle for one registered descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub usize);

/// Conditions a registration asks to be woken for. Hang-up and error are
/// always reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    /// Wake when the descriptor is readable.
    pub readable: bool,
    /// Wake when the descriptor is writable.
    pub writable: bool,
}

impl Interest {
    /// Read interest only.
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
    };
}

/// Conditions observed on a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// Data can be read.
    pub readable: bool,
    /// Data can be written.
    pub writable: bool,
    /// The peer hung up.
    pub hangup: bool,
    /// The descriptor is in an error state.
    pub error: bool,
}

/// Reactor failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactorError {
    /// Waiting for readiness failed.
    #[error("readiness wait failed: {0}")]
    Poll(#[source] Errno),
    /// The token names no registration.
    #[error("no registration for token {}", .0.0)]
    UnknownToken(Token),
}

/// Readiness notification over raw descriptors.
#[cfg_attr(test, mockall::automock)]
pub trait Reactor {
    /// Starts watching `fd`.
    fn register(&mut self, fd: RawFd, interest: Interest) -> Result<Token, ReactorError>;

    /// Stops watching the descriptor behind `token`.
    fn unregister(&mut self, token: Token) -> Result<(), ReactorError>;

    /// Blocks until at least one registration is ready or `timeout` elapses.
    /// `None` waits indefinitely.
    fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<(Token, Readiness)>, ReactorError>;
}
