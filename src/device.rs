//! Discovered device model and MAC key handling.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};

/// How a device was identified. Ordered by trust: a protocol banner the device
/// sent about itself outranks a guess from its MAC prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiscoveryMethod {
    #[serde(rename = "OUI")]
    Oui = 1,
    #[serde(rename = "CDP")]
    Cdp = 2,
    #[serde(rename = "MNDP")]
    Mndp = 3,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMethod::Oui => "OUI",
            DiscoveryMethod::Cdp => "CDP",
            DiscoveryMethod::Mndp => "MNDP",
        }
    }

    pub fn is_protocol(&self) -> bool {
        !matches!(self, DiscoveryMethod::Oui)
    }
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical device identity: 12 uppercase hex digits, no separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacKey(String);

impl MacKey {
    /// First six hex digits, the vendor-assigned prefix.
    pub fn oui_prefix(&self) -> &str {
        &self.0[..6]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Colon separated form used on the wire, e.g. `AA:BB:CC:DD:EE:FF`.
    pub fn to_display(&self) -> String {
        self.0
            .as_bytes()
            .chunks(2)
            .filter_map(|pair| std::str::from_utf8(pair).ok())
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl From<MacAddr> for MacKey {
    fn from(mac: MacAddr) -> Self {
        MacKey(format!(
            "{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            mac.0, mac.1, mac.2, mac.3, mac.4, mac.5
        ))
    }
}

impl From<[u8; 6]> for MacKey {
    fn from(octets: [u8; 6]) -> Self {
        MacAddr::from(octets).into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidMacKey(pub String);

impl fmt::Display for InvalidMacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address '{}'", self.0)
    }
}

impl std::error::Error for InvalidMacKey {}

impl FromStr for MacKey {
    type Err = InvalidMacKey;

    /// Accepts `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF` or `aabbccddeeff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s
            .chars()
            .filter(|c| *c != ':' && *c != '-' && *c != '.')
            .collect::<String>()
            .to_ascii_uppercase();
        if hex.len() == 12 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(MacKey(hex))
        } else {
            Err(InvalidMacKey(s.to_string()))
        }
    }
}

impl fmt::Display for MacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display())
    }
}

/// A device held in the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub mac: MacKey,
    pub brand: String,
    pub model: String,
    pub name: String,
    pub ip_address: Option<String>,
    pub method: DiscoveryMethod,
    pub device_type: Option<String>,
    pub version: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub signal_strength: Option<i8>,
}

impl Device {
    pub fn new(
        mac: MacKey,
        brand: impl Into<String>,
        model: impl Into<String>,
        method: DiscoveryMethod,
        seen_at: DateTime<Utc>,
    ) -> Self {
        let brand = brand.into();
        Device {
            name: default_name(&brand),
            mac,
            brand,
            model: model.into(),
            ip_address: None,
            method,
            device_type: None,
            version: None,
            first_seen: seen_at,
            last_seen: seen_at,
            signal_strength: None,
        }
    }

    /// Replace identity fields with those of a more trusted observation.
    /// Timestamps, IP and signal are left to `touch`.
    pub(crate) fn adopt_identity(&mut self, other: &Device) {
        self.brand = other.brand.clone();
        self.model = other.model.clone();
        self.name = other.name.clone();
        self.method = other.method;
        self.device_type = other.device_type.clone();
        self.version = other.version.clone();
        if other.ip_address.is_some() {
            self.ip_address = other.ip_address.clone();
        }
    }
}

pub fn default_name(brand: &str) -> String {
    format!("{} Device", brand)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_key_from_mac_addr() {
        let key = MacKey::from(MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff));
        assert_eq!(key.as_str(), "AABBCCDDEEFF");
        assert_eq!(key.to_display(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(key.oui_prefix(), "AABBCC");
    }

    #[test]
    fn test_mac_key_parse_formats() {
        let a: MacKey = "04:18:d6:01:02:03".parse().unwrap();
        let b: MacKey = "04-18-D6-01-02-03".parse().unwrap();
        let c: MacKey = "0418d6010203".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.oui_prefix(), "0418D6");

        assert!("04:18:d6".parse::<MacKey>().is_err());
        assert!("zz:18:d6:01:02:03".parse::<MacKey>().is_err());
    }

    #[test]
    fn test_discovery_method_priority() {
        assert!(DiscoveryMethod::Cdp > DiscoveryMethod::Oui);
        assert!(DiscoveryMethod::Mndp > DiscoveryMethod::Oui);
        assert!(!DiscoveryMethod::Oui.is_protocol());
        assert!(DiscoveryMethod::Cdp.is_protocol());
        assert_eq!(
            serde_json::to_string(&DiscoveryMethod::Mndp).unwrap(),
            "\"MNDP\""
        );
    }

    #[test]
    fn test_device_default_name() {
        let device = Device::new(
            "0418D6010203".parse().unwrap(),
            "Ubiquiti",
            "Unifi Series",
            DiscoveryMethod::Oui,
            Utc::now(),
        );
        assert_eq!(device.name, "Ubiquiti Device");
        assert_eq!(device.first_seen, device.last_seen);
    }
}
