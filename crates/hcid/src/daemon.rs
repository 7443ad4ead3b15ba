//! Daemon context: owns the bus connection, the endpoint tree, and the
//! outstanding PIN requests, and drives them from one reactor.
//!
//! Everything runs on one thread. The only suspension point is the reactor
//! wait inside [`Daemon::turn`], which is bounded by the earliest pending-call
//! deadline so that timeouts surface as ordinary replies.

use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use hcid_config::Config;

use crate::agent::{AgentChannel, PinCorrelator, PinRequest};
use crate::bus::{
    BUS_INTERFACE, BUS_PATH, BUS_SERVICE, BusConnection, BusError, BusHandler, CallOutcome,
    DispatchStatus, Message, ObjectPath, Transport,
};
use crate::dispatch::{HandlerLimits, Router};
use crate::driver::{AdapterDriver, BdAddr};
use crate::health::HealthReporter;
use crate::lifecycle::LifecycleManager;
use crate::reactor::{Interest, Reactor, ReactorBridge, ReactorError, ReadyEvent, Token};
use crate::registry::EndpointRegistry;
use crate::signals::{self, SignalDisposition};

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Do not queue; replacement is not allowed.
const NAME_FLAGS: u32 = 0x4;
const NAME_REQUEST_TIMEOUT: Duration = Duration::from_secs(25);
const PRIMARY_OWNER: u32 = 1;

/// Notifications from the adapter driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// An adapter appeared.
    AdapterAttached(u16),
    /// An adapter went away.
    AdapterDetached(u16),
    /// A controller needs a PIN.
    PinRequested(PinRequest),
    /// An inquiry started on the adapter with this local address.
    InquiryStarted {
        /// Local adapter address.
        local: BdAddr,
    },
    /// An inquiry completed.
    InquiryCompleted {
        /// Local adapter address.
        local: BdAddr,
    },
    /// An inquiry found a device.
    InquiryResult {
        /// Local adapter address.
        local: BdAddr,
        /// Discovered device.
        peer: BdAddr,
        /// Class of device.
        class: u32,
        /// Received signal strength.
        rssi: i8,
    },
    /// A remote name lookup finished.
    RemoteNameResolved {
        /// Local adapter address.
        local: BdAddr,
        /// Remote device.
        peer: BdAddr,
        /// Resolved name.
        name: String,
    },
}

/// The running daemon over transport `T`, reactor `R` and driver `D`.
pub struct Daemon<T, R, D> {
    connection: BusConnection<T>,
    bridge: ReactorBridge<R>,
    router: Router,
    registry: EndpointRegistry,
    lifecycle: LifecycleManager,
    correlator: PinCorrelator,
    driver: D,
    limits: HandlerLimits,
    health: Arc<dyn HealthReporter>,
    shutdown_token: Option<Token>,
    name_request: Option<u32>,
    stopping: bool,
    disconnected: bool,
}

impl<T: Transport, R: Reactor, D: AdapterDriver> Daemon<T, R, D> {
    /// Builds the daemon over an established bus transport.
    ///
    /// Registers the root endpoints, hands the connection's watches to the
    /// reactor, and asks the bus for the configured name.
    pub fn new(
        config: &Config,
        driver: D,
        transport: T,
        reactor: R,
        health: Arc<dyn HealthReporter>,
    ) -> Result<Self, BusError> {
        let mut connection = BusConnection::new(transport);
        let mut bridge = ReactorBridge::new(reactor);
        connection.set_watch_functions(&mut bridge)?;

        let router = Router::standard();
        let mut registry = EndpointRegistry::new();
        let lifecycle = LifecycleManager::new(router.profile_names());
        lifecycle.install_roots(&mut registry);

        let request = Message::new_method_call(BUS_SERVICE, BUS_PATH, BUS_INTERFACE, "RequestName")
            .map_err(BusError::InvalidMessage)?
            .append2(config.bus_name(), NAME_FLAGS);
        let name_request = connection.send_with_reply(request, NAME_REQUEST_TIMEOUT, &mut bridge)?;

        Ok(Self {
            connection,
            bridge,
            router,
            registry,
            lifecycle,
            correlator: PinCorrelator::new(config.agent_timeout()),
            driver,
            limits: HandlerLimits::from_config(config),
            health,
            shutdown_token: None,
            name_request: Some(name_request),
            stopping: false,
            disconnected: false,
        })
    }

    /// Stops the run loop once `fd` becomes readable.
    pub fn watch_shutdown(&mut self, fd: RawFd) -> Result<(), ReactorError> {
        self.shutdown_token = Some(self.bridge.register_foreign(fd, Interest::READABLE)?);
        Ok(())
    }

    /// Publishes endpoints for every adapter the driver already knows.
    pub fn attach_present_adapters(&mut self) {
        match self.driver.adapters() {
            Ok(adapters) => {
                for adapter in adapters {
                    self.handle_host_event(HostEvent::AdapterAttached(adapter.id));
                }
            }
            Err(error) => {
                warn!(target: DAEMON_TARGET, error = %error, "cannot enumerate adapters");
            }
        }
    }

    /// Applies one driver notification.
    pub fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::AdapterAttached(id) => {
                if self.lifecycle.attach(&mut self.registry, id) {
                    self.health.adapter_attached(id);
                }
            }
            HostEvent::AdapterDetached(id) => {
                let mut channel = ConnectionChannel {
                    connection: &mut self.connection,
                    bridge: &mut self.bridge,
                };
                self.correlator
                    .adapter_detached(id, &mut channel, &self.driver);
                if self.lifecycle.detach(&mut self.registry, id) {
                    self.health.adapter_detached(id);
                }
            }
            HostEvent::PinRequested(request) => {
                let mut channel = ConnectionChannel {
                    connection: &mut self.connection,
                    bridge: &mut self.bridge,
                };
                self.correlator
                    .request_pin(request, &mut channel, &self.driver);
            }
            HostEvent::InquiryStarted { local } => {
                let signal = signals::inquiry_start(&self.driver, &local);
                self.emit(signal);
            }
            HostEvent::InquiryCompleted { local } => {
                let signal = signals::inquiry_complete(&self.driver, &local);
                self.emit(signal);
            }
            HostEvent::InquiryResult {
                local,
                peer,
                class,
                rssi,
            } => {
                let signal = signals::inquiry_result(&self.driver, &local, &peer, class, rssi);
                self.emit(signal);
            }
            HostEvent::RemoteNameResolved { local, peer, name } => {
                let signal = signals::remote_name(&self.driver, &local, &peer, &name);
                self.emit(signal);
            }
        }
    }

    fn emit(&mut self, signal: Option<Message>) {
        let Some(signal) = signal else {
            return;
        };
        if let Err(error) = self.connection.send(signal, &mut self.bridge) {
            warn!(target: DAEMON_TARGET, error = %error, "failed to emit signal");
        }
    }

    /// Runs one reactor iteration.
    ///
    /// Waits at most `max_wait` (forever when `None`), or less when a pending
    /// call expires sooner, then processes readiness, synthesises timeouts,
    /// and drains every queued message.
    pub fn turn(&mut self, max_wait: Option<Duration>) -> Result<(), ReactorError> {
        let timeout = if self.connection.queued() > 0 {
            Some(Duration::ZERO)
        } else {
            let until_deadline = self
                .connection
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()));
            match (max_wait, until_deadline) {
                (Some(wait), Some(deadline)) => Some(wait.min(deadline)),
                (wait, deadline) => wait.or(deadline),
            }
        };
        for event in self.bridge.wait(timeout)? {
            match event {
                ReadyEvent::Watch(id, flags) => {
                    if let Err(error) = self.connection.handle_watch(id, flags, &mut self.bridge) {
                        warn!(target: DAEMON_TARGET, watch = %id, error = %error, "bus I/O failed");
                    }
                }
                ReadyEvent::Foreign(token, _) if Some(token) == self.shutdown_token => {
                    info!(target: DAEMON_TARGET, "shutdown requested");
                    self.stopping = true;
                }
                ReadyEvent::Foreign(token, _) => {
                    debug!(target: DAEMON_TARGET, token = token.0, "readiness for unknown registration");
                }
            }
        }
        self.connection.expire_pending(Instant::now());
        self.drain();
        Ok(())
    }

    /// Dispatches queued messages until none remain.
    pub fn drain(&mut self) {
        let was_disconnected = self.disconnected;
        let mut inbound = Inbound {
            router: &self.router,
            registry: &self.registry,
            driver: &self.driver,
            limits: &self.limits,
            correlator: &mut self.correlator,
            name_request: &mut self.name_request,
            disconnected: &mut self.disconnected,
        };
        while self.connection.dispatch(&mut inbound, &mut self.bridge) == DispatchStatus::DataRemains {}
        if self.disconnected && !was_disconnected {
            self.health.bus_disconnected();
        }
    }

    /// Turns the reactor until shutdown is requested or the bus goes away.
    pub fn run(&mut self) -> Result<(), ReactorError> {
        while self.is_running() {
            self.turn(None)?;
        }
        Ok(())
    }

    /// Withdraws every endpoint and releases the connection's watches and the
    /// shutdown registration.
    ///
    /// Outstanding PIN requests fail first. Paths are snapshotted before any
    /// is unregistered so the walk never observes a tree it is mutating.
    pub fn shutdown(&mut self) {
        let adapters: Vec<u16> = self.lifecycle.attached().collect();
        for id in adapters {
            let mut channel = ConnectionChannel {
                connection: &mut self.connection,
                bridge: &mut self.bridge,
            };
            self.correlator
                .adapter_detached(id, &mut channel, &self.driver);
        }
        let paths = self.registry.snapshot_under(&ObjectPath::root());
        for path in &paths {
            if let Err(error) = self.registry.unregister(path) {
                warn!(target: DAEMON_TARGET, error = %error, "failed to withdraw endpoint");
            }
        }
        self.connection.clear_watch_functions(&mut self.bridge);
        if let Some(token) = self.shutdown_token.take()
            && let Err(error) = self.bridge.unregister_foreign(token)
        {
            warn!(target: DAEMON_TARGET, error = %error, "failed to release shutdown watch");
        }
        info!(target: DAEMON_TARGET, endpoints = paths.len(), "endpoints withdrawn");
    }

    /// `false` once shutdown was requested or the bus disconnected.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.stopping && !self.disconnected
    }

    /// The endpoint tree.
    #[must_use]
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Outstanding PIN requests.
    #[must_use]
    pub fn correlator(&self) -> &PinCorrelator {
        &self.correlator
    }

    /// Attached adapters.
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// The adapter driver.
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Returns `true` while a shutdown descriptor is registered.
    #[must_use]
    pub fn watches_shutdown(&self) -> bool {
        self.shutdown_token.is_some()
    }

    /// Returns `true` while the bus has not answered the name request.
    #[must_use]
    pub fn awaiting_name(&self) -> bool {
        self.name_request.is_some()
    }
}

struct ConnectionChannel<'a, T, R> {
    connection: &'a mut BusConnection<T>,
    bridge: &'a mut ReactorBridge<R>,
}

impl<T: Transport, R: Reactor> AgentChannel for ConnectionChannel<'_, T, R> {
    fn call(&mut self, message: Message, timeout: Duration) -> Result<u32, BusError> {
        self.connection
            .send_with_reply(message, timeout, &mut *self.bridge)
    }

    fn cancel(&mut self, serial: u32) {
        self.connection.cancel_pending(serial);
    }
}

struct Inbound<'a, D> {
    router: &'a Router,
    registry: &'a EndpointRegistry,
    driver: &'a D,
    limits: &'a HandlerLimits,
    correlator: &'a mut PinCorrelator,
    name_request: &'a mut Option<u32>,
    disconnected: &'a mut bool,
}

impl<D: AdapterDriver> BusHandler for Inbound<'_, D> {
    fn method_call(&mut self, call: &Message) -> CallOutcome {
        self.router
            .route(call, self.registry, self.driver, self.limits)
    }

    fn reply(&mut self, serial: u32, reply: Result<&Message, dbus::Error>) {
        if *self.name_request == Some(serial) {
            *self.name_request = None;
            log_name_reply(reply);
            return;
        }
        if self.correlator.complete(serial, reply, self.driver).is_none() {
            debug!(target: DAEMON_TARGET, serial, "reply matched no outstanding request");
        }
    }

    fn signal(&mut self, signal: &Message) -> bool {
        match signals::classify(signal) {
            SignalDisposition::Disconnected => {
                *self.disconnected = true;
                true
            }
            SignalDisposition::Consumed => true,
            SignalDisposition::Ignored => false,
        }
    }
}

fn log_name_reply(reply: Result<&Message, dbus::Error>) {
    match reply.map(|answer| answer.get1::<u32>()) {
        Ok(Some(PRIMARY_OWNER)) => info!(target: DAEMON_TARGET, "acquired bus name"),
        Ok(result) => warn!(target: DAEMON_TARGET, result = ?result, "bus name not acquired"),
        Err(error) => warn!(
            target: DAEMON_TARGET,
            error = error.name().unwrap_or_default(),
            "bus name request failed"
        ),
    }
}
