//! A daemon wired to an in-process bus peer.

use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hcid_config::Config;

use crate::bus::{Message, MessageType};
use crate::daemon::Daemon;
use crate::reactor::PollReactor;

use super::bus::{BusPeer, LoopbackTransport, loopback};
use super::{RecordingDriver, RecordingHealthReporter};

const TURN_WAIT: Duration = Duration::from_millis(200);
const PRIMARY_OWNER: u32 = 1;

pub(crate) struct DaemonHarness {
    pub(crate) daemon: Daemon<LoopbackTransport, PollReactor, RecordingDriver>,
    pub(crate) peer: BusPeer,
    pub(crate) reporter: Arc<RecordingHealthReporter>,
    shutdown: (UnixStream, UnixStream),
}

impl DaemonHarness {
    /// Starts a daemon and answers its bus name request.
    pub(crate) fn start(config: &Config) -> Self {
        Self::start_with(config, RecordingDriver::new())
    }

    /// Starts a daemon over `driver` and answers its bus name request.
    pub(crate) fn start_with(config: &Config, driver: RecordingDriver) -> Self {
        let (transport, peer) = loopback();
        let reporter = Arc::new(RecordingHealthReporter::default());
        let daemon = Daemon::new(
            config,
            driver,
            transport,
            PollReactor::new(),
            reporter.clone(),
        )
        .expect("daemon starts");
        let mut harness = Self {
            daemon,
            peer,
            reporter,
            shutdown: UnixStream::pair().expect("shutdown pair"),
        };
        let request = harness.peer.receive();
        assert_eq!(request.member().as_deref(), Some("RequestName"));
        assert_eq!(
            request.read1::<&str>().expect("requested name"),
            config.bus_name()
        );
        harness
            .peer
            .send(request.method_return().append1(PRIMARY_OWNER));
        harness.turn();
        assert!(!harness.daemon.awaiting_name(), "name request unanswered");
        harness
    }

    /// Read end of a descriptor the daemon can watch for shutdown.
    pub(crate) fn shutdown_fd(&self) -> RawFd {
        self.shutdown.0.as_raw_fd()
    }

    pub(crate) fn turn(&mut self) {
        self.daemon.turn(Some(TURN_WAIT)).expect("reactor turn");
    }

    /// Turns the reactor until `duration` has elapsed.
    pub(crate) fn run_for(&mut self, duration: Duration) {
        let until = Instant::now() + duration;
        while let Some(remaining) = until.checked_duration_since(Instant::now()) {
            if remaining.is_zero() {
                break;
            }
            self.daemon.turn(Some(remaining)).expect("reactor turn");
        }
    }

    /// Sends a call from the peer and returns the daemon's answer.
    pub(crate) fn call(&mut self, path: &str, interface: &str, member: &str) -> Message {
        let call = Message::new_method_call("org.bluez", path, interface, member)
            .expect("method call");
        let serial = self.peer.send(call);
        self.turn();
        let reply = self.peer.receive();
        assert_eq!(reply.get_reply_serial(), Some(serial));
        assert!(matches!(
            reply.msg_type(),
            MessageType::MethodReturn | MessageType::Error
        ));
        reply
    }
}
