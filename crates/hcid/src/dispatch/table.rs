//! Per-interface method tables.

use std::time::Duration;

use hcid_config::Config;

use crate::bus::Message;
use crate::catalog::ErrorCode;
use crate::driver::AdapterDriver;
use crate::registry::EndpointId;

/// Limits applied to slow controller operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerLimits {
    /// Bound on a remote name lookup.
    pub remote_name_timeout: Duration,
    /// Bound on a role switch.
    pub role_switch_timeout: Duration,
    /// Maximum connection records per reply.
    pub max_connections: usize,
}

impl HandlerLimits {
    /// Reads the limits from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            remote_name_timeout: config.remote_name_timeout(),
            role_switch_timeout: config.role_switch_timeout(),
            max_connections: config.max_connections(),
        }
    }
}

impl Default for HandlerLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// State a handler may consult while serving one call.
pub struct HandlerContext<'a> {
    /// Endpoint the call was addressed to.
    pub endpoint: EndpointId,
    /// Hardware access.
    pub driver: &'a dyn AdapterDriver,
    /// Operation bounds.
    pub limits: &'a HandlerLimits,
}

/// Result of a handler invocation.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Send this method return.
    Reply(Message),
    /// Reply with a catalog error.
    Error(ErrorCode),
    /// Send nothing back.
    NoReply,
}

impl<E> From<Result<Message, E>> for HandlerOutcome
where
    E: Into<ErrorCode>,
{
    fn from(result: Result<Message, E>) -> Self {
        match result {
            Ok(reply) => Self::Reply(reply),
            Err(error) => Self::Error(error.into()),
        }
    }
}

/// Function serving one method. It receives the whole call so it can read
/// the arguments and build the matching method return.
pub type MethodFn = fn(&HandlerContext<'_>, &Message) -> HandlerOutcome;

/// What a table entry does when matched.
#[derive(Debug, Clone, Copy)]
pub enum MethodHandler {
    /// Invoke the function.
    Call(MethodFn),
    /// Recognised but not implemented; nothing is sent back.
    NotImplemented,
}

#[derive(Debug, Clone)]
struct MethodEntry {
    name: &'static str,
    signature: &'static str,
    handler: MethodHandler,
}

/// Result of matching a method name and signature against a table.
#[derive(Debug, Clone, Copy)]
pub enum MethodLookup {
    /// No entry has the method name.
    UnknownMethod,
    /// Entries have the name but none has the signature.
    WrongSignature,
    /// The first entry matching both.
    Found(MethodHandler),
}

/// Methods served on one interface, in declaration order.
#[derive(Debug, Clone)]
pub struct ServiceTable {
    interface: &'static str,
    methods: Vec<MethodEntry>,
}

impl ServiceTable {
    /// Starts an empty table for `interface`.
    #[must_use]
    pub fn new(interface: &'static str) -> Self {
        Self {
            interface,
            methods: Vec::new(),
        }
    }

    /// Appends an implemented method.
    #[must_use]
    pub fn method(self, name: &'static str, signature: &'static str, handler: MethodFn) -> Self {
        self.entry(name, signature, MethodHandler::Call(handler))
    }

    /// Appends a recognised method that is not implemented.
    #[must_use]
    pub fn not_implemented(self, name: &'static str, signature: &'static str) -> Self {
        self.entry(name, signature, MethodHandler::NotImplemented)
    }

    fn entry(mut self, name: &'static str, signature: &'static str, handler: MethodHandler) -> Self {
        self.methods.push(MethodEntry {
            name,
            signature,
            handler,
        });
        self
    }

    /// Interface the table serves.
    #[must_use]
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Finds the handler for `method` called with `signature`.
    ///
    /// Entries sharing a name are overloads; the first whose signature
    /// matches wins.
    #[must_use]
    pub fn lookup(&self, method: &str, signature: &str) -> MethodLookup {
        let mut named = self.methods.iter().filter(|entry| entry.name == method).peekable();
        if named.peek().is_none() {
            return MethodLookup::UnknownMethod;
        }
        named
            .find(|entry| entry.signature == signature)
            .map_or(MethodLookup::WrongSignature, |entry| {
                MethodLookup::Found(entry.handler)
            })
    }
}
