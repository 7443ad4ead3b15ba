//! In-memory adapter driver that records every hardware interaction.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::time::Duration;

use nix::errno::Errno;

use crate::driver::{
    AdapterDriver, AdapterInfo, BdAddr, ConnectionInfo, ControlSession, DriverError, HciCommand,
    InquiryInfo, InquiryRequest,
};

/// Role switch recorded by [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RoleSwitch {
    pub(crate) adapter: u16,
    pub(crate) peer: BdAddr,
    pub(crate) role: u8,
    pub(crate) timeout: Duration,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingDriver {
    adapters: Vec<AdapterInfo>,
    default_route: Option<u16>,
    links: Vec<(u16, ConnectionInfo)>,
    inquiry_results: Vec<InquiryInfo>,
    remote_names: BTreeMap<BdAddr, String>,
    failures: BTreeMap<&'static str, Errno>,
    commands: RefCell<Vec<(u16, HciCommand)>>,
    role_switches: RefCell<Vec<RoleSwitch>>,
    inquiries: RefCell<Vec<(u16, InquiryRequest)>>,
    calls: Cell<usize>,
    opened: Cell<usize>,
    closed: Cell<usize>,
}

impl RecordingDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_adapter(mut self, id: u16, address: &str, up: bool) -> Self {
        self.adapters.push(AdapterInfo {
            id,
            name: format!("hci{id}"),
            address: address.parse().expect("adapter address"),
            up,
        });
        self
    }

    pub(crate) fn with_default_route(mut self, id: u16) -> Self {
        self.default_route = Some(id);
        self
    }

    pub(crate) fn with_link(mut self, adapter: u16, handle: u16, peer: &str) -> Self {
        self.links.push((
            adapter,
            ConnectionInfo {
                handle,
                address: peer.parse().expect("peer address"),
                link_type: 1,
                outgoing: true,
                state: 1,
                link_mode: 0,
            },
        ));
        self
    }

    pub(crate) fn with_inquiry_result(mut self, peer: &str, class: u32, clock_offset: u16) -> Self {
        self.inquiry_results.push(InquiryInfo {
            address: peer.parse().expect("peer address"),
            class,
            clock_offset,
        });
        self
    }

    pub(crate) fn with_remote_name(mut self, peer: &str, name: &str) -> Self {
        self.remote_names
            .insert(peer.parse().expect("peer address"), name.to_owned());
        self
    }

    /// Makes `operation` fail with `errno`.
    pub(crate) fn failing(mut self, operation: &'static str, errno: Errno) -> Self {
        self.failures.insert(operation, errno);
        self
    }

    pub(crate) fn commands(&self) -> Vec<(u16, HciCommand)> {
        self.commands.borrow().clone()
    }

    pub(crate) fn role_switches(&self) -> Vec<RoleSwitch> {
        self.role_switches.borrow().clone()
    }

    pub(crate) fn inquiries(&self) -> Vec<(u16, InquiryRequest)> {
        self.inquiries.borrow().clone()
    }

    /// Number of driver operations invoked, sessions included.
    pub(crate) fn calls(&self) -> usize {
        self.calls.get()
    }

    pub(crate) fn sessions_opened(&self) -> usize {
        self.opened.get()
    }

    pub(crate) fn sessions_closed(&self) -> usize {
        self.closed.get()
    }

    fn record(&self, operation: &'static str) -> Result<(), DriverError> {
        self.calls.set(self.calls.get() + 1);
        self.failures
            .get(operation)
            .map_or(Ok(()), |errno| Err(DriverError::new(*errno)))
    }
}

impl AdapterDriver for RecordingDriver {
    fn adapters(&self) -> Result<Vec<AdapterInfo>, DriverError> {
        self.record("adapters")?;
        Ok(self.adapters.clone())
    }

    fn default_route(&self, peer: Option<&BdAddr>) -> Option<u16> {
        self.calls.set(self.calls.get() + 1);
        peer.and_then(|peer| self.adapter_with_connection(peer))
            .or(self.default_route)
    }

    fn adapter_with_connection(&self, peer: &BdAddr) -> Option<u16> {
        self.links
            .iter()
            .find(|(_, link)| link.address == *peer)
            .map(|(adapter, _)| *adapter)
    }

    fn adapter_for_address(&self, local: &BdAddr) -> Option<u16> {
        self.adapters
            .iter()
            .find(|adapter| adapter.address == *local)
            .map(|adapter| adapter.id)
    }

    fn open(&self, adapter: u16) -> Result<Box<dyn ControlSession + '_>, DriverError> {
        self.record("open")?;
        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(RecordingSession {
            driver: self,
            adapter,
        }))
    }

    fn inquiry(
        &self,
        adapter: u16,
        request: InquiryRequest,
    ) -> Result<Vec<InquiryInfo>, DriverError> {
        self.record("inquiry")?;
        self.inquiries.borrow_mut().push((adapter, request));
        Ok(self
            .inquiry_results
            .iter()
            .take(usize::from(request.max_responses))
            .cloned()
            .collect())
    }

    fn connections(&self, adapter: u16, limit: usize) -> Result<Vec<ConnectionInfo>, DriverError> {
        self.record("connections")?;
        Ok(self
            .links
            .iter()
            .filter(|(owner, _)| *owner == adapter)
            .map(|(_, link)| link.clone())
            .take(limit)
            .collect())
    }
}

struct RecordingSession<'a> {
    driver: &'a RecordingDriver,
    adapter: u16,
}

impl ControlSession for RecordingSession<'_> {
    fn send_command(&mut self, command: &HciCommand) -> Result<(), DriverError> {
        self.driver.record("send_command")?;
        self.driver
            .commands
            .borrow_mut()
            .push((self.adapter, command.clone()));
        Ok(())
    }

    fn switch_role(&mut self, peer: &BdAddr, role: u8, timeout: Duration) -> Result<(), DriverError> {
        self.driver.record("switch_role")?;
        self.driver.role_switches.borrow_mut().push(RoleSwitch {
            adapter: self.adapter,
            peer: *peer,
            role,
            timeout,
        });
        Ok(())
    }

    fn read_remote_name(&mut self, peer: &BdAddr, _timeout: Duration) -> Result<String, DriverError> {
        self.driver.record("read_remote_name")?;
        self.driver
            .remote_names
            .get(peer)
            .cloned()
            .ok_or(DriverError::new(Errno::EIO))
    }
}

impl Drop for RecordingSession<'_> {
    fn drop(&mut self) {
        self.driver.closed.set(self.driver.closed.get() + 1);
    }
}
