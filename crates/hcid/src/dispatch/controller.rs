//! Adapter control methods served on the `Controller` profile.
//!
//! Every handler resolves the target adapter first. Concrete endpoints name
//! their adapter directly; the alias follows the driver's default route.
//! Sessions are opened per call and released when the handler returns.
//!
//! Profile endpoints answer on the manager interface. The controller
//! interface names the signals raised from these endpoints.

use dbus::arg::TypeMismatchError;
use nix::errno::Errno;
use tracing::debug;

use crate::bus::Message;
use crate::catalog::{ErrorCode, ProtocolError};
use crate::driver::{BdAddr, GIAC_LAP, HciCommand, InquiryMode, InquiryRequest};
use crate::registry::EndpointId;

use super::manager::MANAGER_INTERFACE;
use super::table::{HandlerContext, HandlerOutcome, ServiceTable};

const CONTROLLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch::controller");

/// Interface of the signals raised from controller endpoints.
pub const CONTROLLER_INTERFACE: &str = "org.bluez.Controller";
/// Path segment naming the controller profile.
pub const CONTROLLER_PROFILE: &str = "Controller";

const PERIODIC_INQUIRY_RESPONSES: u8 = 100;
const CLASS_MASK: u32 = 0x00ff_ffff;

pub(crate) fn table() -> ServiceTable {
    ServiceTable::new(MANAGER_INTERFACE)
        .method("PeriodicInquiry", "yyy", periodic_inquiry)
        .method("CancelPeriodic", "", cancel_periodic)
        .method("Inquiry", "yyq", inquiry)
        .method("RoleSwitch", "sy", role_switch)
        .method("RemoteName", "s", remote_name)
        .method("Connections", "", connections)
}

fn wrong_signature(error: &TypeMismatchError) -> HandlerOutcome {
    debug!(target: CONTROLLER_TARGET, error = %error, "argument mismatch");
    HandlerOutcome::Error(ProtocolError::WrongSignature.into())
}

fn wrong_param() -> ErrorCode {
    ProtocolError::WrongParam.into()
}

fn completed(call: &Message) -> Message {
    call.method_return().append1(0_u8)
}

fn target_adapter(context: &HandlerContext<'_>) -> Result<u16, ErrorCode> {
    match context.endpoint {
        EndpointId::Concrete(id) => Ok(id),
        _ => context
            .driver
            .default_route(None)
            .ok_or(ErrorCode::Hardware(Errno::ENODEV)),
    }
}

fn parse_peer(text: &str) -> Result<BdAddr, ErrorCode> {
    text.parse().map_err(|error| {
        debug!(target: CONTROLLER_TARGET, error = %error, "rejected peer address");
        wrong_param()
    })
}

/// A byte read as a signed count must be strictly positive.
fn positive_signed(byte: u8) -> bool {
    (1..=0x7f).contains(&byte)
}

fn periodic_inquiry(context: &HandlerContext<'_>, call: &Message) -> HandlerOutcome {
    let (length, min_period, max_period) = match call.read3::<u8, u8, u8>() {
        Ok(args) => args,
        Err(error) => return wrong_signature(&error),
    };
    if length >= min_period || min_period >= max_period {
        return HandlerOutcome::Error(wrong_param());
    }
    start_periodic_inquiry(context, call, length, min_period, max_period).into()
}

fn start_periodic_inquiry(
    context: &HandlerContext<'_>,
    call: &Message,
    length: u8,
    min_period: u8,
    max_period: u8,
) -> Result<Message, ErrorCode> {
    let adapter = target_adapter(context)?;
    let mut session = context.driver.open(adapter)?;
    session.send_command(&HciCommand::WriteInquiryMode(InquiryMode::Rssi))?;
    session.send_command(&HciCommand::PeriodicInquiry {
        max_period: u16::from(max_period),
        min_period: u16::from(min_period),
        lap: GIAC_LAP,
        length,
        num_rsp: PERIODIC_INQUIRY_RESPONSES,
    })?;
    debug!(target: CONTROLLER_TARGET, adapter, length, min_period, max_period, "periodic inquiry started");
    Ok(completed(call))
}

fn cancel_periodic(context: &HandlerContext<'_>, call: &Message) -> HandlerOutcome {
    stop_periodic_inquiry(context, call).into()
}

fn stop_periodic_inquiry(context: &HandlerContext<'_>, call: &Message) -> Result<Message, ErrorCode> {
    let adapter = target_adapter(context)?;
    let mut session = context.driver.open(adapter)?;
    session.send_command(&HciCommand::ExitPeriodicInquiry)?;
    Ok(completed(call))
}

fn inquiry(context: &HandlerContext<'_>, call: &Message) -> HandlerOutcome {
    let (length, max_responses, flags) = match call.read3::<u8, u8, u16>() {
        Ok(args) => args,
        Err(error) => return wrong_signature(&error),
    };
    if !positive_signed(length) || !positive_signed(max_responses) {
        return HandlerOutcome::Error(wrong_param());
    }
    let request = InquiryRequest {
        length,
        max_responses,
        flags,
    };
    run_inquiry(context, call, request).into()
}

fn run_inquiry(
    context: &HandlerContext<'_>,
    call: &Message,
    request: InquiryRequest,
) -> Result<Message, ErrorCode> {
    let adapter = target_adapter(context)?;
    let found = context.driver.inquiry(adapter, request)?;
    let entries: Vec<(String, u32, u16)> = found
        .into_iter()
        .map(|info| (info.address.to_string(), info.class & CLASS_MASK, info.clock_offset))
        .collect();
    Ok(call.method_return().append1(entries))
}

fn role_switch(context: &HandlerContext<'_>, call: &Message) -> HandlerOutcome {
    match call.read2::<&str, u8>() {
        Ok((peer, role)) => switch_role(context, call, peer, role).into(),
        Err(error) => wrong_signature(&error),
    }
}

fn switch_role(
    context: &HandlerContext<'_>,
    call: &Message,
    peer: &str,
    role: u8,
) -> Result<Message, ErrorCode> {
    let peer = parse_peer(peer)?;
    let adapter = context
        .driver
        .adapter_with_connection(&peer)
        .ok_or(ErrorCode::Hardware(Errno::ENODEV))?;
    if let EndpointId::Concrete(id) = context.endpoint
        && id != adapter
    {
        return Err(ProtocolError::ConnectionNotFound.into());
    }
    let mut session = context.driver.open(adapter)?;
    session.switch_role(&peer, role, context.limits.role_switch_timeout)?;
    Ok(completed(call))
}

fn remote_name(context: &HandlerContext<'_>, call: &Message) -> HandlerOutcome {
    match call.read1::<&str>() {
        Ok(peer) => read_remote_name(context, call, peer).into(),
        Err(error) => wrong_signature(&error),
    }
}

fn read_remote_name(
    context: &HandlerContext<'_>,
    call: &Message,
    peer: &str,
) -> Result<Message, ErrorCode> {
    let peer = parse_peer(peer)?;
    let adapter = match context.endpoint {
        EndpointId::Concrete(id) => id,
        _ => context
            .driver
            .default_route(Some(&peer))
            .ok_or(ErrorCode::Hardware(Errno::ENODEV))?,
    };
    let mut session = context.driver.open(adapter)?;
    let name = session.read_remote_name(&peer, context.limits.remote_name_timeout)?;
    Ok(call.method_return().append1(name))
}

fn connections(context: &HandlerContext<'_>, call: &Message) -> HandlerOutcome {
    list_connections(context, call).into()
}

fn list_connections(context: &HandlerContext<'_>, call: &Message) -> Result<Message, ErrorCode> {
    let adapter = target_adapter(context)?;
    let limit = context.limits.max_connections;
    let links = context.driver.connections(adapter, limit)?;
    let entries: Vec<(u16, String, u8, u8, u16, u32)> = links
        .into_iter()
        .take(limit)
        .map(|link| {
            (
                link.handle,
                link.address.to_string(),
                link.link_type,
                u8::from(link.outgoing),
                link.state,
                link.link_mode,
            )
        })
        .collect();
    Ok(call.method_return().append1(entries))
}
