//! PIN agent correlation.
//!
//! When a controller asks for a PIN, the daemon forwards the request to the
//! external agent service and keeps the context keyed by call serial. Each
//! outstanding request terminates exactly once: the agent answers, the call
//! times out, the request is superseded, or its adapter goes away. Every
//! termination except supersession answers the controller.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bus::{BusError, ERROR_NO_REPLY, Message};
use crate::driver::{AdapterDriver, BdAddr, HciCommand};

const AGENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::agent");

/// Bus name of the PIN agent.
pub const AGENT_SERVICE: &str = "org.bluez.PinAgent";
/// Interface the agent serves.
pub const AGENT_INTERFACE: &str = "org.bluez.PinAgent";
/// Path the agent serves.
pub const AGENT_PATH: &str = "/org/bluez/PinAgent";
/// Method invoked on the agent.
pub const AGENT_METHOD: &str = "PinRequest";
/// Longest PIN a controller accepts.
pub const MAX_PIN_LEN: usize = 16;

/// A controller's request for a PIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinRequest {
    /// Adapter that raised the request.
    pub adapter: u16,
    /// Remote device being paired.
    pub peer: BdAddr,
    /// `true` when the pairing was locally initiated.
    pub outgoing: bool,
}

/// How an outstanding request terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    /// The agent supplied a usable PIN.
    Fulfilled,
    /// The agent failed, answered unusably, or the adapter went away.
    Failed,
    /// The agent did not answer in time.
    TimedOut,
}

/// Outbound path to the agent.
pub trait AgentChannel {
    /// Sends `message` expecting a reply within `timeout`; returns its serial.
    fn call(&mut self, message: Message, timeout: Duration) -> Result<u32, BusError>;

    /// Forgets an outstanding call so its reply is never delivered.
    fn cancel(&mut self, serial: u32);
}

/// Outstanding PIN requests keyed by agent call serial.
#[derive(Debug)]
pub struct PinCorrelator {
    timeout: Duration,
    pending: BTreeMap<u32, PinRequest>,
}

impl PinCorrelator {
    /// Builds a correlator whose agent calls time out after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: BTreeMap::new(),
        }
    }

    /// Forwards a PIN request to the agent.
    ///
    /// An outstanding request for the same adapter and peer is superseded:
    /// its call is cancelled and the controller hears only about the new
    /// request. Returns the agent call serial, or `None` when the call could
    /// not be sent, in which case the controller is refused immediately.
    pub fn request_pin(
        &mut self,
        request: PinRequest,
        channel: &mut dyn AgentChannel,
        driver: &dyn AdapterDriver,
    ) -> Option<u32> {
        if let Some(serial) = self.serial_for(request.adapter, &request.peer) {
            self.pending.remove(&serial);
            channel.cancel(serial);
            info!(
                target: AGENT_TARGET,
                adapter = request.adapter,
                peer = %request.peer,
                serial,
                "superseding outstanding PIN request"
            );
        }
        let message = match Message::new_method_call(
            AGENT_SERVICE,
            AGENT_PATH,
            AGENT_INTERFACE,
            AGENT_METHOD,
        ) {
            Ok(call) => call.append2(request.outgoing, request.peer.controller_order().to_vec()),
            Err(error) => {
                warn!(target: AGENT_TARGET, error = %error, "cannot build PIN request");
                refuse(driver, &request);
                return None;
            }
        };
        match channel.call(message, self.timeout) {
            Ok(serial) => {
                debug!(
                    target: AGENT_TARGET,
                    adapter = request.adapter,
                    peer = %request.peer,
                    serial,
                    "PIN request forwarded"
                );
                self.pending.insert(serial, request);
                Some(serial)
            }
            Err(error) => {
                warn!(
                    target: AGENT_TARGET,
                    adapter = request.adapter,
                    peer = %request.peer,
                    error = %error,
                    "cannot reach PIN agent"
                );
                refuse(driver, &request);
                None
            }
        }
    }

    /// Resolves the request whose agent call was sent as `serial`.
    ///
    /// `reply` is the agent's answer, or the error that stood in for one.
    /// Returns `None` when `serial` matches no outstanding request.
    pub fn complete(
        &mut self,
        serial: u32,
        reply: Result<&Message, dbus::Error>,
        driver: &dyn AdapterDriver,
    ) -> Option<PinOutcome> {
        let request = self.pending.remove(&serial)?;
        let outcome = match reply {
            Ok(answer) => match answer.get1::<&str>() {
                Some(pin) if (1..=MAX_PIN_LEN).contains(&pin.len()) => {
                    send(
                        driver,
                        request.adapter,
                        &HciCommand::PinCodeReply {
                            peer: request.peer,
                            pin: pin.as_bytes().to_vec(),
                        },
                    );
                    PinOutcome::Fulfilled
                }
                _ => PinOutcome::Failed,
            },
            Err(error) if error.name() == Some(ERROR_NO_REPLY) => PinOutcome::TimedOut,
            Err(error) => {
                debug!(
                    target: AGENT_TARGET,
                    serial,
                    error = error.name().unwrap_or_default(),
                    "PIN agent answered with an error"
                );
                PinOutcome::Failed
            }
        };
        if outcome != PinOutcome::Fulfilled {
            refuse(driver, &request);
        }
        info!(
            target: AGENT_TARGET,
            adapter = request.adapter,
            peer = %request.peer,
            serial,
            outcome = ?outcome,
            "PIN request resolved"
        );
        Some(outcome)
    }

    /// Fails every request raised by `adapter`.
    ///
    /// Returns how many requests were dropped.
    pub fn adapter_detached(
        &mut self,
        adapter: u16,
        channel: &mut dyn AgentChannel,
        driver: &dyn AdapterDriver,
    ) -> usize {
        let serials: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, request)| request.adapter == adapter)
            .map(|(serial, _)| *serial)
            .collect();
        for serial in &serials {
            if let Some(request) = self.pending.remove(serial) {
                channel.cancel(*serial);
                refuse(driver, &request);
            }
        }
        if !serials.is_empty() {
            info!(target: AGENT_TARGET, adapter, dropped = serials.len(), "PIN requests failed on detach");
        }
        serials.len()
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` while `serial` awaits an answer.
    #[must_use]
    pub fn is_pending(&self, serial: u32) -> bool {
        self.pending.contains_key(&serial)
    }

    fn serial_for(&self, adapter: u16, peer: &BdAddr) -> Option<u32> {
        self.pending
            .iter()
            .find(|(_, request)| request.adapter == adapter && request.peer == *peer)
            .map(|(serial, _)| *serial)
    }
}

fn refuse(driver: &dyn AdapterDriver, request: &PinRequest) {
    send(
        driver,
        request.adapter,
        &HciCommand::PinCodeNegativeReply { peer: request.peer },
    );
}

fn send(driver: &dyn AdapterDriver, adapter: u16, command: &HciCommand) {
    let result = driver
        .open(adapter)
        .and_then(|mut session| session.send_command(command));
    if let Err(error) = result {
        warn!(target: AGENT_TARGET, adapter, error = %error, "cannot answer PIN request");
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::tests::support::{RecordingChannel, RecordingDriver, method_call};
    use crate::bus::MessageSignature;

    const PEER: &str = "00:11:22:33:44:55";

    struct Fixture {
        correlator: PinCorrelator,
        channel: RecordingChannel,
        driver: RecordingDriver,
    }

    impl Fixture {
        fn request(&mut self, adapter: u16, peer: &str) -> Option<u32> {
            let request = PinRequest {
                adapter,
                peer: peer.parse().expect("peer"),
                outgoing: false,
            };
            self.correlator
                .request_pin(request, &mut self.channel, &self.driver)
        }

        fn answer(&mut self, serial: u32, pin: &str) -> Option<PinOutcome> {
            let reply = method_call(AGENT_PATH, AGENT_INTERFACE, AGENT_METHOD)
                .method_return()
                .append1(pin);
            self.correlator.complete(serial, Ok(&reply), &self.driver)
        }

        fn fail(&mut self, serial: u32, name: &str) -> Option<PinOutcome> {
            let error = dbus::Error::new_custom(name, "no PIN");
            self.correlator.complete(serial, Err(error), &self.driver)
        }
    }

    #[fixture]
    fn fixture() -> Fixture {
        Fixture {
            correlator: PinCorrelator::new(Duration::from_secs(30)),
            channel: RecordingChannel::default(),
            driver: RecordingDriver::new(),
        }
    }

    #[rstest]
    fn request_body_carries_direction_and_reversed_address(mut fixture: Fixture) {
        let serial = fixture.request(0, PEER).expect("sent");
        assert_eq!(fixture.channel.last_serial(), Some(serial));
        let (_, message, timeout) = fixture.channel.sent.first().expect("call");
        assert_eq!(message.destination().as_deref(), Some(AGENT_SERVICE));
        assert_eq!(message.member().as_deref(), Some(AGENT_METHOD));
        assert_eq!(&*message.signature(), "bay");
        assert_eq!(
            message.read2::<bool, Vec<u8>>().expect("request body"),
            (false, vec![0x55, 0x44, 0x33, 0x22, 0x11, 0x00])
        );
        assert_eq!(*timeout, Duration::from_secs(30));
    }

    #[rstest]
    #[case("1234", PinOutcome::Fulfilled)]
    #[case("", PinOutcome::Failed)]
    #[case("12345678901234567", PinOutcome::Failed)]
    fn answers_the_controller_once(mut fixture: Fixture, #[case] pin: &str, #[case] expected: PinOutcome) {
        let serial = fixture.request(0, PEER).expect("sent");
        assert_eq!(fixture.answer(serial, pin), Some(expected));
        assert_eq!(fixture.answer(serial, pin), None);
        let commands = fixture.driver.commands();
        assert_eq!(commands.len(), 1);
        let positive = matches!(commands.first(), Some((0, HciCommand::PinCodeReply { .. })));
        assert_eq!(positive, expected == PinOutcome::Fulfilled);
    }

    #[rstest]
    #[case(ERROR_NO_REPLY, PinOutcome::TimedOut)]
    #[case("org.bluez.Error.Rejected", PinOutcome::Failed)]
    fn error_answers_refuse_the_controller(
        mut fixture: Fixture,
        #[case] name: &str,
        #[case] expected: PinOutcome,
    ) {
        let serial = fixture.request(0, PEER).expect("sent");
        assert_eq!(fixture.fail(serial, name), Some(expected));
        assert!(matches!(
            fixture.driver.commands().as_slice(),
            [(0, HciCommand::PinCodeNegativeReply { .. })]
        ));
    }

    #[rstest]
    fn newer_request_supersedes_older(mut fixture: Fixture) {
        let first = fixture.request(0, PEER).expect("first");
        let second = fixture.request(0, PEER).expect("second");
        assert_eq!(fixture.channel.cancelled, vec![first]);
        assert_eq!(fixture.channel.last_serial(), Some(second));
        assert!(!fixture.correlator.is_pending(first));
        assert!(fixture.correlator.is_pending(second));
        assert!(fixture.driver.commands().is_empty());
    }

    #[rstest]
    fn detach_fails_only_that_adapter(mut fixture: Fixture) {
        fixture.request(0, PEER).expect("adapter 0");
        let kept = fixture.request(1, PEER).expect("adapter 1");
        let dropped = fixture
            .correlator
            .adapter_detached(0, &mut fixture.channel, &fixture.driver);
        assert_eq!(dropped, 1);
        assert_eq!(fixture.correlator.pending(), 1);
        assert!(fixture.correlator.is_pending(kept));
    }

    #[rstest]
    fn unreachable_agent_refuses_immediately(mut fixture: Fixture) {
        fixture.channel.disconnected = true;
        assert_eq!(fixture.request(0, PEER), None);
        assert_eq!(fixture.correlator.pending(), 0);
        assert_eq!(fixture.driver.commands().len(), 1);
    }
}
