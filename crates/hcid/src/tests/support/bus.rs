//! In-process bus wire: a [`Transport`] for the daemon and a peer that plays
//! the bus daemon and its clients.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;

use crate::bus::{BusError, LOCAL_INTERFACE, LOCAL_PATH, Message, Transport};

#[derive(Debug)]
struct Wire {
    to_daemon: VecDeque<Message>,
    from_daemon: VecDeque<Message>,
    outbox: VecDeque<Message>,
    next_daemon_serial: u32,
    next_peer_serial: u32,
    hold_output: bool,
    connected: bool,
}

impl Default for Wire {
    fn default() -> Self {
        Self {
            to_daemon: VecDeque::new(),
            from_daemon: VecDeque::new(),
            outbox: VecDeque::new(),
            next_daemon_serial: 0,
            next_peer_serial: 1000,
            hold_output: false,
            connected: true,
        }
    }
}

impl Wire {
    fn flush(&mut self) {
        if !self.hold_output {
            self.from_daemon.append(&mut self.outbox);
        }
    }
}

/// Daemon side of the loopback. Its descriptor becomes readable whenever the
/// peer queues something.
pub(crate) struct LoopbackTransport {
    wire: Rc<RefCell<Wire>>,
    wake: UnixStream,
}

/// Far side of the loopback.
pub(crate) struct BusPeer {
    wire: Rc<RefCell<Wire>>,
    wake: UnixStream,
}

/// Builds a connected transport and peer.
pub(crate) fn loopback() -> (LoopbackTransport, BusPeer) {
    let (daemon_end, peer_end) = UnixStream::pair().expect("socket pair");
    daemon_end.set_nonblocking(true).expect("nonblocking wake socket");
    let wire = Rc::new(RefCell::new(Wire::default()));
    (
        LoopbackTransport {
            wire: Rc::clone(&wire),
            wake: daemon_end,
        },
        BusPeer {
            wire,
            wake: peer_end,
        },
    )
}

/// Builds a method call carrying a serial, as if it had crossed the wire.
pub(crate) fn method_call(path: &str, interface: &str, member: &str) -> Message {
    let mut call =
        Message::new_method_call("org.bluez.test", path, interface, member).expect("method call");
    call.set_serial(7);
    call
}

impl Transport for LoopbackTransport {
    fn fd(&self) -> RawFd {
        self.wake.as_raw_fd()
    }

    fn wants_write(&self) -> bool {
        !self.wire.borrow().outbox.is_empty()
    }

    fn read_write(&mut self) -> Result<(), BusError> {
        let mut buffer = [0_u8; 64];
        loop {
            match self.wake.read(&mut buffer) {
                Ok(0) => break,
                Ok(_) => {}
                Err(error) if error.kind() == ErrorKind::WouldBlock => break,
                Err(_) => return Err(BusError::Disconnected),
            }
        }
        let mut wire = self.wire.borrow_mut();
        wire.flush();
        if wire.connected {
            Ok(())
        } else {
            Err(BusError::Disconnected)
        }
    }

    fn pop_message(&mut self) -> Option<Message> {
        self.wire.borrow_mut().to_daemon.pop_front()
    }

    fn send(&mut self, mut message: Message) -> Result<u32, BusError> {
        let mut wire = self.wire.borrow_mut();
        if !wire.connected {
            return Err(BusError::Disconnected);
        }
        wire.next_daemon_serial += 1;
        let serial = wire.next_daemon_serial;
        message.set_serial(serial);
        wire.outbox.push_back(message);
        wire.flush();
        Ok(serial)
    }

    fn is_connected(&self) -> bool {
        self.wire.borrow().connected
    }
}

impl BusPeer {
    /// Delivers `message` to the daemon and returns its serial.
    pub(crate) fn send(&mut self, mut message: Message) -> u32 {
        let serial = {
            let mut wire = self.wire.borrow_mut();
            wire.next_peer_serial += 1;
            message.set_serial(wire.next_peer_serial);
            wire.to_daemon.push_back(message);
            wire.next_peer_serial
        };
        self.wake();
        serial
    }

    /// Takes the oldest message the daemon has written.
    pub(crate) fn receive(&mut self) -> Message {
        self.wire
            .borrow_mut()
            .from_daemon
            .pop_front()
            .expect("daemon sent nothing")
    }

    /// `true` when the daemon has written nothing further.
    pub(crate) fn is_idle(&self) -> bool {
        self.wire.borrow().from_daemon.is_empty()
    }

    /// Keeps daemon output queued on its side until released.
    pub(crate) fn hold_output(&mut self, hold: bool) {
        self.wire.borrow_mut().hold_output = hold;
    }

    /// Drops the connection the way libdbus reports a lost bus.
    pub(crate) fn hang_up(&mut self) {
        let disconnected =
            Message::new_signal(LOCAL_PATH, LOCAL_INTERFACE, "Disconnected").expect("signal");
        {
            let mut wire = self.wire.borrow_mut();
            wire.connected = false;
            wire.to_daemon.push_back(disconnected);
        }
        self.wake();
    }

    fn wake(&mut self) {
        self.wake.write_all(&[1]).expect("wake daemon");
    }
}
