//! Readiness-driven bus connection with pending-reply tracking.

use std::collections::{BTreeMap, VecDeque};
use std::ffi::CString;
use std::time::{Duration, Instant};

use dbus::Message;
use dbus::message::MessageType;
use tracing::{debug, info, warn};

use super::errors::BusError;
use super::transport::Transport;
use super::watch::{Watch, WatchFlags, WatchId, WatchRegistrar};
use super::{ERROR_NO_REPLY, ERROR_UNKNOWN_METHOD, LOCAL_INTERFACE, LOCAL_PATH, MessageSignature, is_signal};

const BUS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bus");
const READ_WATCH: WatchId = WatchId::new(1);
const WRITE_WATCH: WatchId = WatchId::new(2);
const NO_REPLY_TEXT: &str = "Did not receive a reply before the timeout expired";

/// Whether more queued messages await dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// At least one message is still queued.
    DataRemains,
    /// The incoming queue is empty.
    Complete,
}

/// How a message handler disposed of a method call.
#[derive(Debug)]
pub enum CallOutcome {
    /// The call was consumed; the optional reply is sent back to the caller.
    Handled(Option<Message>),
    /// No handler claimed the call.
    NotHandled,
}

/// Receiver of dispatched messages.
pub trait BusHandler {
    /// Handles an inbound method call.
    fn method_call(&mut self, call: &Message) -> CallOutcome;

    /// Receives the answer to the call sent as `serial` with
    /// [`BusConnection::send_with_reply`]. Error replies and timeouts arrive
    /// as `Err`.
    fn reply(&mut self, serial: u32, reply: Result<&Message, dbus::Error>);

    /// Handles a signal. Returns `false` when the signal was not of interest.
    fn signal(&mut self, signal: &Message) -> bool;
}

#[derive(Debug)]
enum Inbound {
    Message(Message),
    TimedOut(u32),
}

#[derive(Debug, Clone, Copy)]
struct PendingCall {
    deadline: Instant,
    expired: bool,
}

/// A bus connection driven by readiness callbacks.
///
/// The read watch stays enabled; the write watch is enabled only while the
/// transport holds unsent messages. Each call made with
/// [`send_with_reply`](Self::send_with_reply) yields exactly one reply or one
/// `NoReply` timeout.
pub struct BusConnection<T> {
    transport: T,
    incoming: VecDeque<Inbound>,
    pending: BTreeMap<u32, PendingCall>,
    read_watch: Watch,
    write_watch: Watch,
    connected: bool,
    disconnect_queued: bool,
}

impl<T: Transport> BusConnection<T> {
    /// Wraps a connected transport.
    pub fn new(transport: T) -> Self {
        let fd = transport.fd();
        Self {
            transport,
            incoming: VecDeque::new(),
            pending: BTreeMap::new(),
            read_watch: Watch::new(READ_WATCH, fd, WatchFlags::READABLE, true),
            write_watch: Watch::new(WRITE_WATCH, fd, WatchFlags::WRITABLE, false),
            connected: true,
            disconnect_queued: false,
        }
    }

    /// Returns `false` once the bus has gone away.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Hands both watches to the event loop.
    pub fn set_watch_functions(
        &mut self,
        registrar: &mut dyn WatchRegistrar,
    ) -> Result<(), BusError> {
        registrar.add_watch(&self.read_watch)?;
        registrar.add_watch(&self.write_watch)?;
        Ok(())
    }

    /// Withdraws both watches from the event loop.
    pub fn clear_watch_functions(&mut self, registrar: &mut dyn WatchRegistrar) {
        registrar.remove_watch(&self.read_watch);
        registrar.remove_watch(&self.write_watch);
    }

    /// Queues `message` and returns the serial the transport assigned.
    pub fn send(
        &mut self,
        message: Message,
        registrar: &mut dyn WatchRegistrar,
    ) -> Result<u32, BusError> {
        if !self.connected {
            return Err(BusError::Disconnected);
        }
        let serial = match self.transport.send(message) {
            Ok(serial) => serial,
            Err(error) => {
                self.connection_lost();
                return Err(error);
            }
        };
        self.sync_write_watch(registrar)?;
        Ok(serial)
    }

    /// Sends a call and tracks its reply until `timeout` elapses.
    pub fn send_with_reply(
        &mut self,
        message: Message,
        timeout: Duration,
        registrar: &mut dyn WatchRegistrar,
    ) -> Result<u32, BusError> {
        let serial = self.send(message, registrar)?;
        self.pending.insert(
            serial,
            PendingCall {
                deadline: Instant::now() + timeout,
                expired: false,
            },
        );
        Ok(serial)
    }

    /// Forgets a pending call; any later reply is dropped.
    pub fn cancel_pending(&mut self, serial: u32) -> bool {
        self.pending.remove(&serial).is_some()
    }

    /// Returns `true` while a reply for `serial` is outstanding.
    #[must_use]
    pub fn is_pending(&self, serial: u32) -> bool {
        self.pending.contains_key(&serial)
    }

    /// Earliest deadline among unexpired pending calls.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .filter(|call| !call.expired)
            .map(|call| call.deadline)
            .min()
    }

    /// Queues a timeout for every pending call past its deadline.
    pub fn expire_pending(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        for (serial, call) in &mut self.pending {
            if call.expired || call.deadline > now {
                continue;
            }
            call.expired = true;
            expired += 1;
            self.incoming.push_back(Inbound::TimedOut(*serial));
        }
        if expired > 0 {
            debug!(target: BUS_TARGET, expired, "pending calls timed out");
        }
        expired
    }

    /// Processes readiness reported for one of this connection's watches.
    pub fn handle_watch(
        &mut self,
        id: WatchId,
        flags: WatchFlags,
        registrar: &mut dyn WatchRegistrar,
    ) -> Result<(), BusError> {
        if id != self.read_watch.id() && id != self.write_watch.id() {
            return Ok(());
        }
        let moved = self.transport.read_write();
        self.collect_incoming();
        if let Err(error) = moved {
            debug!(target: BUS_TARGET, watch = %id, error = %error, "transport stopped");
            self.connection_lost();
        } else if flags.intersects(WatchFlags::HANGUP | WatchFlags::ERROR)
            || !self.transport.is_connected()
        {
            self.connection_lost();
        }
        if self.connected {
            self.sync_write_watch(registrar)?;
        }
        Ok(())
    }

    /// Number of messages awaiting dispatch.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.incoming.len()
    }

    /// Delivers the next queued message to `handler`.
    ///
    /// Replies are delivered only while their call is pending. Unhandled
    /// method calls that expect an answer receive the standard
    /// `UnknownMethod` error.
    pub fn dispatch(
        &mut self,
        handler: &mut dyn BusHandler,
        registrar: &mut dyn WatchRegistrar,
    ) -> DispatchStatus {
        match self.incoming.pop_front() {
            Some(Inbound::TimedOut(serial)) => {
                if self.pending.remove(&serial).is_some() {
                    handler.reply(serial, Err(dbus::Error::new_custom(ERROR_NO_REPLY, NO_REPLY_TEXT)));
                }
            }
            Some(Inbound::Message(mut message)) => match message.msg_type() {
                MessageType::MethodReturn | MessageType::Error => {
                    self.deliver_reply(&mut message, handler);
                }
                MessageType::MethodCall => self.deliver_call(&message, handler, registrar),
                MessageType::Signal => {
                    if !handler.signal(&message) {
                        debug!(
                            target: BUS_TARGET,
                            interface = message.interface().as_deref().unwrap_or_default(),
                            member = message.member().as_deref().unwrap_or_default(),
                            "signal ignored"
                        );
                    }
                }
            },
            None => {}
        }
        if self.incoming.is_empty() {
            DispatchStatus::Complete
        } else {
            DispatchStatus::DataRemains
        }
    }

    fn deliver_reply(&mut self, reply: &mut Message, handler: &mut dyn BusHandler) {
        let reply_serial = reply.get_reply_serial();
        let Some(serial) = reply_serial.filter(|serial| self.pending.remove(serial).is_some())
        else {
            debug!(target: BUS_TARGET, ?reply_serial, "dropping reply without a pending call");
            return;
        };
        let answer = reply.as_result().map(|message| &*message);
        handler.reply(serial, answer);
    }

    fn deliver_call(
        &mut self,
        call: &Message,
        handler: &mut dyn BusHandler,
        registrar: &mut dyn WatchRegistrar,
    ) {
        let answer = match handler.method_call(call) {
            CallOutcome::Handled(reply) => reply,
            CallOutcome::NotHandled => Some(unknown_method(call)),
        };
        let Some(reply) = answer.filter(|_| !call.get_no_reply()) else {
            return;
        };
        if let Err(error) = self.send(reply, registrar) {
            warn!(
                target: BUS_TARGET,
                serial = call.get_serial(),
                error = %error,
                "failed to send reply"
            );
        }
    }

    fn collect_incoming(&mut self) {
        while let Some(message) = self.transport.pop_message() {
            if is_signal(&message, LOCAL_INTERFACE, "Disconnected") {
                if self.disconnect_queued {
                    continue;
                }
                self.disconnect_queued = true;
                self.connected = false;
            }
            self.incoming.push_back(Inbound::Message(message));
        }
    }

    fn sync_write_watch(&mut self, registrar: &mut dyn WatchRegistrar) -> Result<(), BusError> {
        let wants_write = self.transport.wants_write();
        if wants_write != self.write_watch.is_enabled() {
            self.write_watch.set_enabled(wants_write);
            registrar.watch_toggled(&self.write_watch)?;
        }
        Ok(())
    }

    /// Marks the bus as gone and makes sure exactly one `Disconnected`
    /// signal reaches the handler, whether or not libdbus queued one.
    fn connection_lost(&mut self) {
        if self.connected {
            self.connected = false;
            info!(target: BUS_TARGET, "bus connection lost");
        }
        if self.disconnect_queued {
            return;
        }
        match Message::new_signal(LOCAL_PATH, LOCAL_INTERFACE, "Disconnected") {
            Ok(signal) => {
                self.disconnect_queued = true;
                self.incoming.push_back(Inbound::Message(signal));
            }
            Err(error) => warn!(target: BUS_TARGET, %error, "cannot raise disconnect signal"),
        }
    }
}

fn unknown_method(call: &Message) -> Message {
    let text = format!(
        "Method \"{}\" with signature \"{}\" on interface \"{}\" doesn't exist",
        call.member().as_deref().unwrap_or_default(),
        &*call.signature(),
        call.interface().as_deref().unwrap_or_default(),
    );
    call.error(
        &ERROR_UNKNOWN_METHOD.into(),
        &CString::new(text).unwrap_or_default(),
    )
}
