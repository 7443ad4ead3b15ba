//! Methods served on the manager endpoint.

use crate::bus::Message;
use crate::catalog::ErrorCode;

use super::table::{HandlerContext, HandlerOutcome, ServiceTable};

/// Interface of the manager endpoint, and of every per-adapter profile
/// endpoint published beneath it.
pub const MANAGER_INTERFACE: &str = "org.bluez.Manager";

pub(crate) fn table() -> ServiceTable {
    ServiceTable::new(MANAGER_INTERFACE)
        .method("DeviceList", "", device_list)
        .not_implemented("Init", "")
        .not_implemented("Enable", "")
        .not_implemented("Disable", "")
}

/// Lists `(name, address)` for every adapter that is up.
fn device_list(context: &HandlerContext<'_>, call: &Message) -> HandlerOutcome {
    let adapters = match context.driver.adapters() {
        Ok(adapters) => adapters,
        Err(error) => return HandlerOutcome::Error(ErrorCode::Hardware(error.errno())),
    };
    let entries: Vec<(String, String)> = adapters
        .into_iter()
        .filter(|adapter| adapter.up)
        .map(|adapter| (adapter.name, adapter.address.to_string()))
        .collect();
    HandlerOutcome::Reply(call.method_return().append1(entries))
}
