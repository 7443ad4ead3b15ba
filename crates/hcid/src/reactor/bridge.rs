//! Maps bus watches onto reactor registrations.

use std::collections::BTreeMap;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use tracing::{debug, warn};

use crate::bus::{Watch, WatchError, WatchFlags, WatchId, WatchRegistrar};

use super::{Interest, Reactor, ReactorError, Readiness, Token};

const BRIDGE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reactor");

/// Readiness translated back into the caller's terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyEvent {
    /// A bus watch is ready.
    Watch(WatchId, WatchFlags),
    /// A descriptor registered directly through the bridge is ready.
    Foreign(Token, Readiness),
}

/// Keeps exactly one reactor registration per enabled watch.
#[derive(Debug)]
pub struct ReactorBridge<R> {
    reactor: R,
    tokens: BTreeMap<WatchId, Token>,
    watches: BTreeMap<Token, WatchId>,
}

impl<R: Reactor> ReactorBridge<R> {
    /// Wraps `reactor`.
    pub fn new(reactor: R) -> Self {
        Self {
            reactor,
            tokens: BTreeMap::new(),
            watches: BTreeMap::new(),
        }
    }

    /// Registers a descriptor that is not a bus watch.
    pub fn register_foreign(&mut self, fd: RawFd, interest: Interest) -> Result<Token, ReactorError> {
        self.reactor.register(fd, interest)
    }

    /// Releases a registration made with [`register_foreign`](Self::register_foreign).
    pub fn unregister_foreign(&mut self, token: Token) -> Result<(), ReactorError> {
        if self.watches.contains_key(&token) {
            return Err(ReactorError::UnknownToken(token));
        }
        self.reactor.unregister(token)
    }

    /// Returns `true` while `id` has a live registration.
    #[must_use]
    pub fn is_armed(&self, id: WatchId) -> bool {
        self.tokens.contains_key(&id)
    }

    /// Waits for readiness and translates each event.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<ReadyEvent>, ReactorError> {
        let ready = self.reactor.wait(timeout)?;
        Ok(ready
            .into_iter()
            .map(|(token, readiness)| match self.watches.get(&token) {
                Some(id) => ReadyEvent::Watch(*id, translate(readiness)),
                None => ReadyEvent::Foreign(token, readiness),
            })
            .collect())
    }

    fn arm(&mut self, watch: &Watch) -> Result<(), WatchError> {
        if self.tokens.contains_key(&watch.id()) {
            return Ok(());
        }
        let interest = Interest {
            readable: watch.flags().contains(WatchFlags::READABLE),
            writable: watch.flags().contains(WatchFlags::WRITABLE),
        };
        let token = self
            .reactor
            .register(watch.fd(), interest)
            .map_err(|error| WatchError::new(watch.id(), io::Error::other(error)))?;
        debug!(target: BRIDGE_TARGET, watch = %watch.id(), fd = watch.fd(), "watch armed");
        self.tokens.insert(watch.id(), token);
        self.watches.insert(token, watch.id());
        Ok(())
    }

    fn disarm(&mut self, id: WatchId) {
        let Some(token) = self.tokens.remove(&id) else {
            return;
        };
        self.watches.remove(&token);
        if let Err(error) = self.reactor.unregister(token) {
            warn!(target: BRIDGE_TARGET, watch = %id, error = %error, "failed to disarm watch");
        } else {
            debug!(target: BRIDGE_TARGET, watch = %id, "watch disarmed");
        }
    }
}

impl<R: Reactor> WatchRegistrar for ReactorBridge<R> {
    fn add_watch(&mut self, watch: &Watch) -> Result<(), WatchError> {
        if watch.is_enabled() {
            self.arm(watch)
        } else {
            Ok(())
        }
    }

    fn remove_watch(&mut self, watch: &Watch) {
        self.disarm(watch.id());
    }

    fn watch_toggled(&mut self, watch: &Watch) -> Result<(), WatchError> {
        if watch.is_enabled() {
            self.arm(watch)
        } else {
            self.disarm(watch.id());
            Ok(())
        }
    }
}

fn translate(readiness: Readiness) -> WatchFlags {
    let mut flags = WatchFlags::empty();
    if readiness.readable {
        flags |= WatchFlags::READABLE;
    }
    if readiness.writable {
        flags |= WatchFlags::WRITABLE;
    }
    if readiness.hangup {
        flags |= WatchFlags::HANGUP;
    }
    if readiness.error {
        flags |= WatchFlags::ERROR;
    }
    flags
}
