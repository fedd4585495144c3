//! ## spanare-core::mac
//! **48-bit hardware addresses**
//!
//! Addresses are kept as a 32-bit high word (first four octets) and a 16-bit
//! low word (last two octets) so a record stays small and `Copy`.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Reasons a textual MAC address is rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MacParseError {
    #[error("expected 6 octets, found {0}")]
    OctetCount(usize),
    #[error("octet {0} is empty")]
    EmptyOctet(usize),
    #[error("octet {0} has more than two hex digits")]
    OctetTooLong(usize),
    #[error("octet {0} is not hexadecimal")]
    NotHex(usize),
}

/// A MAC address stored as `high = b0..b3`, `low = b4..b5` (big endian).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr {
    high: u32,
    low: u16,
}

impl MacAddr {
    #[inline]
    pub const fn new(high: u32, low: u16) -> Self {
        Self { high, low }
    }

    #[inline]
    pub const fn from_bytes(b: [u8; 6]) -> Self {
        Self {
            high: u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            low: u16::from_be_bytes([b[4], b[5]]),
        }
    }

    #[inline]
    pub const fn to_bytes(self) -> [u8; 6] {
        let h = self.high.to_be_bytes();
        let l = self.low.to_be_bytes();
        [h[0], h[1], h[2], h[3], l[0], l[1]]
    }

    /// First four octets.
    #[inline]
    pub const fn high(self) -> u32 {
        self.high
    }

    /// Last two octets.
    #[inline]
    pub const fn low(self) -> u16 {
        self.low
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(bytes: [u8; 6]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    /// Parses `aa:bb:cc:dd:ee:ff`. Each octet is one or two hex digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut count = 0;

        for (i, part) in s.split(':').enumerate() {
            if i >= 6 {
                return Err(MacParseError::OctetCount(s.split(':').count()));
            }
            if part.is_empty() {
                return Err(MacParseError::EmptyOctet(i));
            }
            if part.len() > 2 {
                return Err(MacParseError::OctetTooLong(i));
            }
            if !part.bytes().all(|c| c.is_ascii_hexdigit()) {
                return Err(MacParseError::NotHex(i));
            }
            bytes[i] = u8::from_str_radix(part, 16).map_err(|_| MacParseError::NotHex(i))?;
            count += 1;
        }

        if count != 6 {
            return Err(MacParseError::OctetCount(count));
        }
        Ok(Self::from_bytes(bytes))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
