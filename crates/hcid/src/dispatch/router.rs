//! Routes inbound method calls to the table serving their endpoint.

use tracing::{debug, info};

use crate::bus::{CallOutcome, Message, MessageSignature, MessageType, ObjectPath};
use crate::catalog::{ErrorCode, ProtocolError, error_reply};
use crate::driver::AdapterDriver;
use crate::registry::{EndpointId, EndpointRegistry, Resolution};

use super::table::{HandlerContext, HandlerLimits, HandlerOutcome, MethodHandler, MethodLookup, ServiceTable};
use super::{controller, device, manager};

const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// A per-adapter profile: its path segment and the methods it serves.
#[derive(Debug, Clone)]
pub struct Profile {
    name: &'static str,
    table: ServiceTable,
}

impl Profile {
    /// Pairs a path segment with its table.
    #[must_use]
    pub fn new(name: &'static str, table: ServiceTable) -> Self {
        Self { name, table }
    }

    /// Path segment naming the profile.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

enum Target<'a> {
    Table(EndpointId, &'a ServiceTable),
    UnknownPath,
    Unrouted,
}

/// Immutable routing tables for every endpoint class.
#[derive(Debug, Clone)]
pub struct Router {
    manager: ServiceTable,
    device: ServiceTable,
    profiles: Vec<Profile>,
}

impl Router {
    /// Builds a router from explicit tables.
    #[must_use]
    pub fn new(manager: ServiceTable, device: ServiceTable, profiles: Vec<Profile>) -> Self {
        Self {
            manager,
            device,
            profiles,
        }
    }

    /// The daemon's standard tables: manager, device class and the
    /// controller profile.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(
            manager::table(),
            device::table(),
            vec![Profile::new(controller::CONTROLLER_PROFILE, controller::table())],
        )
    }

    /// Profile segments published per adapter.
    #[must_use]
    pub fn profile_names(&self) -> Vec<&'static str> {
        self.profiles.iter().map(Profile::name).collect()
    }

    fn classify<'a>(&'a self, path: &ObjectPath, registry: &EndpointRegistry) -> Target<'a> {
        match registry.lookup(path) {
            Some(Resolution::Exact(EndpointId::Manager)) => {
                Target::Table(EndpointId::Manager, &self.manager)
            }
            Some(Resolution::Exact(EndpointId::Device)) => {
                Target::Table(EndpointId::Device, &self.device)
            }
            Some(Resolution::Exact(id)) => path
                .last_segment()
                .and_then(|segment| self.profiles.iter().find(|profile| profile.name == segment))
                .map_or(Target::Unrouted, |profile| Target::Table(id, &profile.table)),
            Some(Resolution::Fallback {
                id: EndpointId::Manager,
                ..
            }) => Target::UnknownPath,
            Some(Resolution::Fallback { .. }) | None => Target::Unrouted,
        }
    }

    /// Routes one method call.
    ///
    /// Calls that name no served interface are left for the connection to
    /// answer. Paths below the manager that name nothing registered are
    /// answered with an unknown-path error regardless of interface.
    pub fn route(
        &self,
        call: &Message,
        registry: &EndpointRegistry,
        driver: &dyn AdapterDriver,
        limits: &HandlerLimits,
    ) -> CallOutcome {
        if call.msg_type() != MessageType::MethodCall {
            return CallOutcome::NotHandled;
        }
        let Some(path) = call.path().and_then(|path| ObjectPath::parse(&path).ok()) else {
            return CallOutcome::NotHandled;
        };
        let (endpoint, table) = match self.classify(&path, registry) {
            Target::Table(endpoint, table) => (endpoint, table),
            Target::UnknownPath => {
                debug!(target: ROUTER_TARGET, path = %path, endpoint = %EndpointId::Manager, "unknown path");
                return CallOutcome::Handled(Some(error_reply(
                    call,
                    ProtocolError::UnknownPath.into(),
                )));
            }
            Target::Unrouted => return CallOutcome::NotHandled,
        };
        let (Some(interface), Some(member_name)) = (call.interface(), call.member()) else {
            return CallOutcome::NotHandled;
        };
        let member: &str = &member_name;
        debug!(
            target: ROUTER_TARGET,
            path = %path,
            endpoint = %endpoint,
            member,
            "routing call"
        );
        if &*interface != table.interface() {
            return CallOutcome::NotHandled;
        }
        let handler = match table.lookup(member, &call.signature()) {
            MethodLookup::UnknownMethod => return reject(call, ProtocolError::UnknownMethod),
            MethodLookup::WrongSignature => return reject(call, ProtocolError::WrongSignature),
            MethodLookup::Found(MethodHandler::NotImplemented) => {
                info!(target: ROUTER_TARGET, path = %path, member, "method not implemented");
                return CallOutcome::Handled(None);
            }
            MethodLookup::Found(MethodHandler::Call(handler)) => handler,
        };
        let context = HandlerContext {
            endpoint,
            driver,
            limits,
        };
        match handler(&context, call) {
            HandlerOutcome::Reply(reply) => CallOutcome::Handled(Some(reply)),
            HandlerOutcome::Error(code) => {
                debug!(target: ROUTER_TARGET, path = %path, member, error = %code, "call failed");
                CallOutcome::Handled(Some(error_reply(call, code)))
            }
            HandlerOutcome::NoReply => CallOutcome::Handled(None),
        }
    }
}

fn reject(call: &Message, error: ProtocolError) -> CallOutcome {
    CallOutcome::Handled(Some(error_reply(call, ErrorCode::Protocol(error))))
}
