//! Method dispatch: per-interface tables, the handlers behind them, and the
//! router that picks a table for each inbound call.

mod controller;
mod device;
mod manager;
mod router;
mod table;

pub use controller::{CONTROLLER_INTERFACE, CONTROLLER_PROFILE};
pub use device::DEVICE_INTERFACE;
pub use manager::MANAGER_INTERFACE;
pub use router::{Profile, Router};
pub use table::{
    HandlerContext, HandlerLimits, HandlerOutcome, MethodFn, MethodHandler, MethodLookup,
    ServiceTable,
};
