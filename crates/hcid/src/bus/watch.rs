//! Readiness watches the connection exposes to its event loop.

use std::fmt;
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::os::fd::RawFd;

use thiserror::Error;

/// Identifier of a watch owned by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(u32);

impl WatchId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "watch-{}", self.0)
    }
}

/// Readiness conditions a watch requests or reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchFlags(u8);

impl WatchFlags {
    /// Data can be read.
    pub const READABLE: Self = Self(0b0001);
    /// Data can be written.
    pub const WRITABLE: Self = Self(0b0010);
    /// The peer hung up.
    pub const HANGUP: Self = Self(0b0100);
    /// The descriptor is in an error state.
    pub const ERROR: Self = Self(0b1000);

    /// No conditions.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns `true` when every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` when any bit of `other` is set.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns `true` when no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for WatchFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for WatchFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A descriptor plus the conditions the connection wants reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    id: WatchId,
    fd: RawFd,
    flags: WatchFlags,
    enabled: bool,
}

impl Watch {
    /// Builds a watch.
    #[must_use]
    pub const fn new(id: WatchId, fd: RawFd, flags: WatchFlags, enabled: bool) -> Self {
        Self {
            id,
            fd,
            flags,
            enabled,
        }
    }

    /// Watch identifier.
    #[must_use]
    pub const fn id(&self) -> WatchId {
        self.id
    }

    /// Watched descriptor.
    #[must_use]
    pub const fn fd(&self) -> RawFd {
        self.fd
    }

    /// Requested directions.
    #[must_use]
    pub const fn flags(&self) -> WatchFlags {
        self.flags
    }

    /// Whether the event loop should currently poll this watch.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Failure to hand a watch to the event loop.
#[derive(Debug, Error)]
#[error("failed to register {id} with the event loop: {source}")]
pub struct WatchError {
    id: WatchId,
    #[source]
    source: io::Error,
}

impl WatchError {
    /// Wraps an event-loop failure for `id`.
    #[must_use]
    pub fn new(id: WatchId, source: io::Error) -> Self {
        Self { id, source }
    }
}

/// Event-loop side of the watch protocol.
///
/// The connection calls these hooks as its watches come and go; the
/// implementation decides how descriptors are polled.
pub trait WatchRegistrar {
    /// Starts polling `watch` if it is enabled. Disabled watches are accepted
    /// without registration.
    fn add_watch(&mut self, watch: &Watch) -> Result<(), WatchError>;

    /// Stops polling `watch`.
    fn remove_watch(&mut self, watch: &Watch);

    /// Reacts to `watch` changing its enabled state.
    fn watch_toggled(&mut self, watch: &Watch) -> Result<(), WatchError>;
}
