//! Adapter driver seam.
//!
//! The daemon never talks to controllers directly. Every hardware operation
//! goes through [`AdapterDriver`], which either succeeds or reports an OS
//! errno. Short-lived command channels are modelled as [`ControlSession`]
//! values that release the controller when dropped.

mod address;
mod placeholder;

use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

use crate::catalog::ErrorCode;

pub use address::{AddressParseError, BdAddr};
pub use placeholder::UnavailableDriver;

/// General inquiry access code, least significant byte first.
pub const GIAC_LAP: [u8; 3] = [0x33, 0x8b, 0x9e];

/// Failure reported by the adapter driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("adapter driver failed: {errno}")]
pub struct DriverError {
    errno: Errno,
}

impl DriverError {
    /// Wraps an errno.
    #[must_use]
    pub const fn new(errno: Errno) -> Self {
        Self { errno }
    }

    /// The reported errno.
    #[must_use]
    pub const fn errno(&self) -> Errno {
        self.errno
    }
}

impl From<Errno> for DriverError {
    fn from(errno: Errno) -> Self {
        Self::new(errno)
    }
}

impl From<DriverError> for ErrorCode {
    fn from(error: DriverError) -> Self {
        Self::Hardware(error.errno)
    }
}

/// Snapshot of one adapter known to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Adapter index.
    pub id: u16,
    /// Kernel device name, e.g. `hci0`.
    pub name: String,
    /// Local controller address.
    pub address: BdAddr,
    /// Whether the adapter is up.
    pub up: bool,
}

/// One device discovered by an inquiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryInfo {
    /// Remote address.
    pub address: BdAddr,
    /// 24-bit class of device.
    pub class: u32,
    /// Clock offset reported by the remote.
    pub clock_offset: u16,
}

/// Parameters of a blocking inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InquiryRequest {
    /// Inquiry length in 1.28 s units.
    pub length: u8,
    /// Maximum number of responses.
    pub max_responses: u8,
    /// Driver-specific inquiry flags.
    pub flags: u16,
}

/// One active link on an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Connection handle.
    pub handle: u16,
    /// Remote address.
    pub address: BdAddr,
    /// Link type.
    pub link_type: u8,
    /// `true` when the link was locally initiated.
    pub outgoing: bool,
    /// Connection state.
    pub state: u16,
    /// Link mode bitmask.
    pub link_mode: u32,
}

/// Inquiry result reporting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquiryMode {
    /// Standard inquiry results.
    Standard,
    /// Inquiry results with RSSI.
    Rssi,
}

/// Controller commands the daemon issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HciCommand {
    /// Selects the inquiry result format.
    WriteInquiryMode(InquiryMode),
    /// Starts periodic inquiry.
    PeriodicInquiry {
        /// Maximum period between inquiries.
        max_period: u16,
        /// Minimum period between inquiries.
        min_period: u16,
        /// Inquiry access code, least significant byte first.
        lap: [u8; 3],
        /// Inquiry length.
        length: u8,
        /// Maximum number of responses.
        num_rsp: u8,
    },
    /// Stops periodic inquiry.
    ExitPeriodicInquiry,
    /// Supplies a PIN for a pairing request.
    PinCodeReply {
        /// Remote device.
        peer: BdAddr,
        /// PIN bytes, at most 16.
        pin: Vec<u8>,
    },
    /// Rejects a pairing request.
    PinCodeNegativeReply {
        /// Remote device.
        peer: BdAddr,
    },
}

/// A command channel to one adapter, released on drop.
pub trait ControlSession {
    /// Sends a controller command without waiting for completion.
    fn send_command(&mut self, command: &HciCommand) -> Result<(), DriverError>;

    /// Requests a role change on the link to `peer`.
    fn switch_role(&mut self, peer: &BdAddr, role: u8, timeout: Duration)
    -> Result<(), DriverError>;

    /// Reads the user-friendly name of `peer`.
    fn read_remote_name(&mut self, peer: &BdAddr, timeout: Duration)
    -> Result<String, DriverError>;
}

/// Hardware operations the daemon depends on.
pub trait AdapterDriver {
    /// Lists every adapter.
    fn adapters(&self) -> Result<Vec<AdapterInfo>, DriverError>;

    /// Picks the adapter to use for `peer`, or the default adapter.
    fn default_route(&self, peer: Option<&BdAddr>) -> Option<u16>;

    /// Finds the adapter holding a connection to `peer`.
    fn adapter_with_connection(&self, peer: &BdAddr) -> Option<u16>;

    /// Finds the adapter whose local address is `local`.
    fn adapter_for_address(&self, local: &BdAddr) -> Option<u16>;

    /// Opens a command session on `adapter`.
    fn open(&self, adapter: u16) -> Result<Box<dyn ControlSession + '_>, DriverError>;

    /// Runs a blocking inquiry on `adapter`.
    fn inquiry(
        &self,
        adapter: u16,
        request: InquiryRequest,
    ) -> Result<Vec<InquiryInfo>, DriverError>;

    /// Lists up to `limit` active links on `adapter`.
    fn connections(&self, adapter: u16, limit: usize) -> Result<Vec<ConnectionInfo>, DriverError>;
}
