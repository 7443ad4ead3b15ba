//! `poll(2)` reactor.

use std::collections::BTreeMap;
use std::os::fd::{BorrowedFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use super::{Interest, Reactor, ReactorError, Readiness, Token};

/// Reactor that polls every registration on each wait.
#[derive(Debug, Default)]
pub struct PollReactor {
    next_token: usize,
    registrations: BTreeMap<Token, (RawFd, Interest)>,
}

impl PollReactor {
    /// Builds an empty reactor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poll_flags(interest: Interest) -> PollFlags {
    let mut flags = PollFlags::empty();
    if interest.readable {
        flags |= PollFlags::POLLIN;
    }
    if interest.writable {
        flags |= PollFlags::POLLOUT;
    }
    flags
}

fn readiness(flags: PollFlags) -> Readiness {
    Readiness {
        readable: flags.contains(PollFlags::POLLIN),
        writable: flags.contains(PollFlags::POLLOUT),
        hangup: flags.contains(PollFlags::POLLHUP),
        error: flags.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL),
    }
}

fn poll_timeout(timeout: Option<Duration>) -> PollTimeout {
    timeout.map_or(PollTimeout::NONE, |timeout| {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        PollTimeout::from(millis)
    })
}

impl Reactor for PollReactor {
    fn register(&mut self, fd: RawFd, interest: Interest) -> Result<Token, ReactorError> {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.registrations.insert(token, (fd, interest));
        Ok(token)
    }

    fn unregister(&mut self, token: Token) -> Result<(), ReactorError> {
        self.registrations
            .remove(&token)
            .map(drop)
            .ok_or(ReactorError::UnknownToken(token))
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<(Token, Readiness)>, ReactorError> {
        let tokens: Vec<Token> = self.registrations.keys().copied().collect();
        let mut fds: Vec<PollFd<'_>> = self
            .registrations
            .values()
            .map(|(fd, interest)| {
                // SAFETY: registrants keep their descriptors open until they
                // unregister, and the borrow ends before this call returns.
                let borrowed = unsafe { BorrowedFd::borrow_raw(*fd) };
                PollFd::new(borrowed, poll_flags(*interest))
            })
            .collect();
        match poll(&mut fds, poll_timeout(timeout)) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(Vec::new()),
            Err(errno) => return Err(ReactorError::Poll(errno)),
        }
        Ok(tokens
            .into_iter()
            .zip(&fds)
            .filter_map(|(token, fd)| {
                let flags = fd.revents()?;
                (!flags.is_empty()).then(|| (token, readiness(flags)))
            })
            .collect())
    }
}
