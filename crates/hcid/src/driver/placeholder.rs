//! Driver used until a kernel HCI backend is wired in.

use nix::errno::Errno;

use super::{
    AdapterDriver, AdapterInfo, BdAddr, ConnectionInfo, ControlSession, DriverError, InquiryInfo,
    InquiryRequest,
};

const DRIVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::driver::unavailable");

/// Driver that reports no adapters and fails every hardware request with
/// `ENODEV`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDriver;

impl UnavailableDriver {
    fn unavailable(operation: &'static str, adapter: u16) -> DriverError {
        tracing::warn!(
            target: DRIVER_TARGET,
            operation,
            adapter,
            "adapter access requested but not yet implemented"
        );
        DriverError::new(Errno::ENODEV)
    }
}

impl AdapterDriver for UnavailableDriver {
    fn adapters(&self) -> Result<Vec<AdapterInfo>, DriverError> {
        Ok(Vec::new())
    }

    fn default_route(&self, _peer: Option<&BdAddr>) -> Option<u16> {
        None
    }

    fn adapter_with_connection(&self, _peer: &BdAddr) -> Option<u16> {
        None
    }

    fn adapter_for_address(&self, _local: &BdAddr) -> Option<u16> {
        None
    }

    fn open(&self, adapter: u16) -> Result<Box<dyn ControlSession + '_>, DriverError> {
        Err(Self::unavailable("open", adapter))
    }

    fn inquiry(
        &self,
        adapter: u16,
        _request: InquiryRequest,
    ) -> Result<Vec<InquiryInfo>, DriverError> {
        Err(Self::unavailable("inquiry", adapter))
    }

    fn connections(
        &self,
        adapter: u16,
        _limit: usize,
    ) -> Result<Vec<ConnectionInfo>, DriverError> {
        Err(Self::unavailable("connections", adapter))
    }
}
