//! Numeric error codes and their human-readable descriptions.
//!
//! Two disjoint families exist. Protocol errors describe malformed or
//! misrouted requests and occupy `0x0001_xxxx`. Hardware errors carry an OS
//! errno reported by the adapter driver and occupy `0x0002_xxxx`. The tag on
//! [`ErrorCode`] decides how a code is described; raw numbers are only
//! produced at the wire boundary.

use std::ffi::CString;
use std::fmt;

use nix::errno::Errno;

use crate::bus::Message;

/// Error name used for every catalog error reply.
pub const ERROR_NAME: &str = "org.bluez.Error";

const PROTOCOL_OFFSET: u32 = 0x0001_0000;
const HARDWARE_OFFSET: u32 = 0x0002_0000;
const FAMILY_MASK: u32 = 0xFFFF_0000;
const DETAIL_MASK: u32 = 0x0000_FFFF;

/// Failures of request shape or routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolError {
    /// No method with the requested name exists on the endpoint.
    UnknownMethod,
    /// The method exists but not with the supplied argument types.
    WrongSignature,
    /// Arguments were well typed but semantically invalid.
    WrongParam,
    /// A requested record does not exist.
    RecordNotFound,
    /// An allocation failed.
    NoMemory,
    /// No adapter holds the connection the request refers to.
    ConnectionNotFound,
    /// The path lies under the manager but names no registered endpoint.
    UnknownPath,
}

impl ProtocolError {
    const ALL: [Self; 7] = [
        Self::UnknownMethod,
        Self::WrongSignature,
        Self::WrongParam,
        Self::RecordNotFound,
        Self::NoMemory,
        Self::ConnectionNotFound,
        Self::UnknownPath,
    ];

    const fn detail(self) -> u32 {
        match self {
            Self::UnknownMethod => 0x01,
            Self::WrongSignature => 0x02,
            Self::WrongParam => 0x03,
            Self::RecordNotFound => 0x04,
            Self::NoMemory => 0x05,
            Self::ConnectionNotFound => 0x06,
            Self::UnknownPath => 0x07,
        }
    }

    /// Fixed human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownMethod => "Method not found",
            Self::WrongSignature => "Wrong method signature",
            Self::WrongParam => "Invalid parameters",
            Self::RecordNotFound => "No record found",
            Self::NoMemory => "No memory",
            Self::ConnectionNotFound => "Connection not found",
            Self::UnknownPath => "Device path is not registered",
        }
    }
}

/// Tagged error code carried by error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A request-level failure.
    Protocol(ProtocolError),
    /// An errno reported by the adapter driver.
    Hardware(Errno),
}

impl ErrorCode {
    /// Wire number of this code.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Protocol(error) => PROTOCOL_OFFSET | error.detail(),
            Self::Hardware(errno) => {
                HARDWARE_OFFSET | (u32::try_from(errno as i32).unwrap_or_default() & DETAIL_MASK)
            }
        }
    }

    /// Recovers a tagged code from its wire number.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        let detail = code & DETAIL_MASK;
        match code & FAMILY_MASK {
            PROTOCOL_OFFSET => ProtocolError::ALL
                .into_iter()
                .find(|error| error.detail() == detail)
                .map(Self::Protocol),
            HARDWARE_OFFSET => {
                let errno = Errno::from_raw(i32::try_from(detail).ok()?);
                (errno != Errno::UnknownErrno).then_some(Self::Hardware(errno))
            }
            _ => None,
        }
    }

    /// Human-readable description, resolved when called.
    #[must_use]
    pub fn describe(self) -> String {
        match self {
            Self::Protocol(error) => error.description().to_owned(),
            Self::Hardware(errno) => errno.desc().to_owned(),
        }
    }
}

impl From<ProtocolError> for ErrorCode {
    fn from(error: ProtocolError) -> Self {
        Self::Protocol(error)
    }
}

impl From<Errno> for ErrorCode {
    fn from(errno: Errno) -> Self {
        Self::Hardware(errno)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} (0x{:08x})", self.describe(), self.code())
    }
}

/// Builds the error reply to `call` for `code`.
///
/// The reply body is `(s description, u code)`.
#[must_use]
pub fn error_reply(call: &Message, code: ErrorCode) -> Message {
    let text = CString::new(code.describe()).unwrap_or_default();
    call.error(&ERROR_NAME.into(), &text).append1(code.code())
}
