// SPDX-License-Identifier: MIT OR Apache-2.0

//! LIN node addressing and slave identity

use std::{fmt, num::ParseIntError, str::FromStr};

/// Raw node address value on the diagnostic transport.
pub type NadId = u8;

/// A single byte addressing a LIN slave node on the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nad(pub NadId);

impl Nad {
    /// The wildcard address accepted by every slave node.
    ///
    /// Diagnostic requests sent to this address are one-way unless a
    /// service contract says otherwise.
    #[must_use]
    pub const fn broadcast() -> Self {
        Nad(0x7F)
    }

    /// The address the iNet box answers to out of the box, before any
    /// assign-NAD request has been processed.
    #[must_use]
    pub const fn initial() -> Self {
        Nad(0x03)
    }

    /// Check if this is the wildcard address.
    #[must_use]
    pub fn is_broadcast(self) -> bool {
        self == Self::broadcast()
    }

    /// Check if a request addressed to `target` selects a node
    /// configured with this address.
    #[must_use]
    pub fn accepts(self, target: Nad) -> bool {
        self == target || target.is_broadcast()
    }
}

impl From<NadId> for Nad {
    fn from(from: NadId) -> Self {
        Nad(from)
    }
}

impl From<Nad> for NadId {
    fn from(from: Nad) -> Self {
        from.0
    }
}

impl FromStr for Nad {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nad = match s.parse::<u8>() {
            Ok(nad) => Ok(nad),
            Err(err) => {
                if let Some(stripped) = s.strip_prefix("0x") {
                    u8::from_str_radix(stripped, 16)
                } else {
                    Err(err)
                }
            }
        }?;
        Ok(Nad(nad))
    }
}

impl fmt::Display for Nad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "broadcast (0x7F)")
        } else {
            write!(f, "{} (0x{:0>2X})", self.0, self.0)
        }
    }
}

/// Product identity of the emulated node: supplier id and function id
/// as they appear on the wire (little-endian words).
///
/// The identity gates assign-NAD and read-by-identifier requests; its
/// low half is echoed in the payload of data upload/download services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity(pub [u8; 4]);

impl Identity {
    /// The identity of the Truma iNet box, as captured from the
    /// reference device.
    #[must_use]
    pub const fn inetbox() -> Self {
        Identity([0x17, 0x46, 0x00, 0x1F])
    }

    /// Supplier id (decoded from the little-endian wire bytes).
    #[must_use]
    pub fn supplier_id(self) -> u16 {
        u16::from_le_bytes([self.0[0], self.0[1]])
    }

    /// Function id (decoded from the little-endian wire bytes).
    #[must_use]
    pub fn function_id(self) -> u16 {
        u16::from_le_bytes([self.0[2], self.0[3]])
    }

    /// The two identity bytes echoed in upload/download payloads.
    #[must_use]
    pub fn echo(self) -> [u8; 2] {
        [self.0[2], self.0[3]]
    }

    /// Check a payload for the leading two-byte identity echo.
    #[must_use]
    pub fn matches_echo(self, payload: &[u8]) -> bool {
        payload.len() >= 2 && payload[..2] == self.echo()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "supplier 0x{:04X}, function 0x{:04X}",
            self.supplier_id(),
            self.function_id()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dec() {
        assert_eq!(Nad(0), Nad::from_str("0").unwrap());
        assert_eq!(Nad(3), Nad::from_str("3").unwrap());
        assert_eq!(Nad(127), Nad::from_str("127").unwrap());
        assert!(Nad::from_str("-1").is_err());
        assert!(Nad::from_str("256").is_err());
    }

    #[test]
    fn parse_hex() {
        assert_eq!(Nad(0x03), Nad::from_str("0x03").unwrap());
        assert_eq!(Nad(0x7F), Nad::from_str("0x7f").unwrap());
        assert_eq!(Nad(0x7F), Nad::from_str("0x7F").unwrap());
        assert!(Nad::from_str("0X03").is_err());
        assert!(Nad::from_str("0x100").is_err());
    }

    #[test]
    fn broadcast_accepts_everyone() {
        assert!(Nad::initial().accepts(Nad::broadcast()));
        assert!(Nad(0x21).accepts(Nad::broadcast()));
        assert!(Nad::initial().accepts(Nad::initial()));
        assert!(!Nad::initial().accepts(Nad(0x04)));
    }

    #[test]
    fn identity_words() {
        let id = Identity::inetbox();
        assert_eq!(id.supplier_id(), 0x4617);
        assert_eq!(id.function_id(), 0x1F00);
        assert_eq!(id.echo(), [0x00, 0x1F]);
        assert!(id.matches_echo(&[0x00, 0x1F, 0xAA]));
        assert!(!id.matches_echo(&[0x00]));
        assert!(!id.matches_echo(&[0x1F, 0x00]));
    }
}
