//! Methods served on the device-class endpoint. None are implemented yet.

use super::table::ServiceTable;

/// Interface of the device-class endpoint.
pub const DEVICE_INTERFACE: &str = "org.bluez.Device";

pub(crate) fn table() -> ServiceTable {
    ServiceTable::new(DEVICE_INTERFACE)
        .not_implemented("Up", "")
        .not_implemented("Down", "")
        .not_implemented("Reset", "")
        .not_implemented("SetProperty", "ss")
        .not_implemented("GetProperty", "s")
}
