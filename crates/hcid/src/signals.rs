//! Outbound controller signals and classification of inbound ones.

use tracing::error;

use crate::bus::{BUS_INTERFACE, LOCAL_INTERFACE, Message, is_signal};
use crate::dispatch::{CONTROLLER_INTERFACE, CONTROLLER_PROFILE};
use crate::driver::{AdapterDriver, BdAddr};
use crate::lifecycle::adapter_path;

const SIGNALS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::signals");

/// Emitted when an inquiry starts.
pub const INQUIRY_START: &str = "InquiryStart";
/// Emitted when an inquiry completes.
pub const INQUIRY_COMPLETE: &str = "InquiryComplete";
/// Emitted per discovered device.
pub const INQUIRY_RESULT: &str = "InquiryResult";
/// Emitted when a remote name is resolved.
pub const REMOTE_NAME: &str = "RemoteName";

/// Builds an empty signal from the controller endpoint of the adapter whose
/// local address is `local`. Returns `None`, after logging, when no adapter
/// owns that address.
fn controller_signal(driver: &dyn AdapterDriver, local: &BdAddr, member: &str) -> Option<Message> {
    let Some(id) = driver.adapter_for_address(local) else {
        error!(target: SIGNALS_TARGET, local = %local, member, "no adapter owns the local address");
        return None;
    };
    let path = match adapter_path(id, CONTROLLER_PROFILE) {
        Ok(path) => path,
        Err(path_error) => {
            error!(target: SIGNALS_TARGET, adapter = id, error = %path_error, "cannot build signal path");
            return None;
        }
    };
    match Message::new_signal(path.as_str(), CONTROLLER_INTERFACE, member) {
        Ok(signal) => Some(signal),
        Err(build_error) => {
            error!(target: SIGNALS_TARGET, adapter = id, member, error = %build_error, "cannot build signal");
            None
        }
    }
}

/// `InquiryStart` with an empty body.
pub fn inquiry_start(driver: &dyn AdapterDriver, local: &BdAddr) -> Option<Message> {
    controller_signal(driver, local, INQUIRY_START)
}

/// `InquiryComplete` with an empty body.
pub fn inquiry_complete(driver: &dyn AdapterDriver, local: &BdAddr) -> Option<Message> {
    controller_signal(driver, local, INQUIRY_COMPLETE)
}

/// `InquiryResult(s address, u class, i rssi)`.
pub fn inquiry_result(
    driver: &dyn AdapterDriver,
    local: &BdAddr,
    peer: &BdAddr,
    class: u32,
    rssi: i8,
) -> Option<Message> {
    controller_signal(driver, local, INQUIRY_RESULT)
        .map(|signal| signal.append3(peer.to_string(), class, i32::from(rssi)))
}

/// `RemoteName(s address, s name)`.
pub fn remote_name(
    driver: &dyn AdapterDriver,
    local: &BdAddr,
    peer: &BdAddr,
    name: &str,
) -> Option<Message> {
    controller_signal(driver, local, REMOTE_NAME).map(|signal| signal.append2(peer.to_string(), name))
}

/// What an inbound signal means to the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDisposition {
    /// The bus connection was lost.
    Disconnected,
    /// Bus housekeeping the daemon acknowledges.
    Consumed,
    /// Not of interest.
    Ignored,
}

/// Classifies an inbound signal.
#[must_use]
pub fn classify(signal: &Message) -> SignalDisposition {
    if is_signal(signal, LOCAL_INTERFACE, "Disconnected") {
        SignalDisposition::Disconnected
    } else if is_signal(signal, BUS_INTERFACE, "NameOwnerChanged")
        || is_signal(signal, BUS_INTERFACE, "NameAcquired")
    {
        SignalDisposition::Consumed
    } else {
        SignalDisposition::Ignored
    }
}
