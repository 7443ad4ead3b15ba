use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use signal_hook::SigId;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::low_level;
use thiserror::Error;
use tracing::debug;

use super::PROCESS_TARGET;

const SHUTDOWN_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Errors reported while installing the shutdown listener.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl From<io::Error> for ShutdownError {
    fn from(source: io::Error) -> Self {
        Self::Install { source }
    }
}

/// Self-pipe that becomes readable when a termination signal arrives.
///
/// The read end is meant to be registered with the reactor; handlers are
/// removed again on drop.
#[derive(Debug)]
pub struct ShutdownPipe {
    read: UnixStream,
    handlers: Vec<SigId>,
}

impl ShutdownPipe {
    /// Routes SIGTERM, SIGINT, SIGQUIT and SIGHUP into a fresh pipe.
    pub fn install() -> Result<Self, ShutdownError> {
        let (read, write) = UnixStream::pair()?;
        read.set_nonblocking(true)?;
        write.set_nonblocking(true)?;
        let mut pipe = Self {
            read,
            handlers: Vec::with_capacity(SHUTDOWN_SIGNALS.len()),
        };
        for signal in SHUTDOWN_SIGNALS {
            let id = low_level::pipe::register(signal, write.try_clone()?)?;
            pipe.handlers.push(id);
        }
        debug!(target: PROCESS_TARGET, "shutdown signal handlers installed");
        Ok(pipe)
    }

    /// Descriptor that turns readable on shutdown.
    #[must_use]
    pub fn fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }
}

impl Drop for ShutdownPipe {
    fn drop(&mut self) {
        for id in self.handlers.drain(..) {
            low_level::unregister(id);
        }
    }
}
