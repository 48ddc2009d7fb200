//! Bluetooth device address.
//!
//! Used both as the advertiser address reported by the scanner and as one of
//! the two identity forms a sensor can be configured with.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth MAC address stored as a compact 6-byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Errors returned when parsing a MAC address string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseMacError {
    #[error("invalid MAC address: expected 6 octets, got {0}")]
    OctetCount(usize),
    #[error("invalid MAC address: octet '{0}' is not two hex digits")]
    Octet(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts `AA:BB:CC:DD:EE:FF` and `aa-bb-cc-dd-ee-ff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.trim().split([':', '-']).collect();
        if octets.len() != 6 {
            return Err(ParseMacError::OctetCount(octets.len()));
        }

        let mut bytes = [0u8; 6];
        for (byte, octet) in bytes.iter_mut().zip(&octets) {
            if octet.len() != 2 {
                return Err(ParseMacError::Octet(octet.to_string()));
            }
            *byte =
                u8::from_str_radix(octet, 16).map_err(|_| ParseMacError::Octet(octet.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let addr = MacAddress([0xA4, 0xC1, 0x38, 0x05, 0x50, 0x72]);
        assert_eq!(addr.to_string(), "A4:C1:38:05:50:72");
    }

    #[test]
    fn test_from_str_accepts_both_separators_and_cases() {
        let expected = MacAddress([0xA4, 0xC1, 0x38, 0x05, 0x50, 0x72]);
        assert_eq!("A4:C1:38:05:50:72".parse::<MacAddress>().unwrap(), expected);
        assert_eq!("a4-c1-38-05-50-72".parse::<MacAddress>().unwrap(), expected);
    }

    #[test]
    fn test_from_str_invalid() {
        assert_eq!(
            "GVH5072_7705".parse::<MacAddress>(),
            Err(ParseMacError::OctetCount(1))
        );
        assert_eq!(
            "A4:C1:38".parse::<MacAddress>(),
            Err(ParseMacError::OctetCount(3))
        );
        assert_eq!(
            "A4:C1:38:05:50:ZZ".parse::<MacAddress>(),
            Err(ParseMacError::Octet("ZZ".to_string()))
        );
        assert_eq!(
            "A4:C1:38:05:50:7".parse::<MacAddress>(),
            Err(ParseMacError::Octet("7".to_string()))
        );
    }
}
