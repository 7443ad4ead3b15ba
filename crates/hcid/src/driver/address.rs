use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A 48-bit device address, stored most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    /// Builds an address from bytes in display order.
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Bytes in display order.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Bytes in controller order (least significant first).
    #[must_use]
    pub fn controller_order(&self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, f] = self.0;
        write!(
            formatter,
            "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{f:02X}"
        )
    }
}

/// Error raised for malformed textual addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid device address '{0}'")]
pub struct AddressParseError(String);

impl FromStr for BdAddr {
    type Err = AddressParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressParseError(input.to_owned());
        let mut bytes = [0_u8; 6];
        let mut parts = input.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}
