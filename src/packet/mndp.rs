//! MikroTik Neighbor Discovery Protocol decoding (UDP port 5678).
//!
//! The UDP payload is a TLV stream: 2-byte type, 2-byte value length, value.

use chrono::{DateTime, Utc};

use crate::device::{Device, DiscoveryMethod, MacKey, default_name};
use crate::error::DecodeError;

pub use crate::config::MNDP_PORT;

/// Broadcast request that makes MikroTik devices announce themselves.
pub const PROBE_PAYLOAD: [u8; 12] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00,
];

const TLV_HEADER_LEN: usize = 4;

pub const TLV_NAME: u16 = 1;
pub const TLV_VERSION: u16 = 5;
pub const TLV_DEVICE_TYPE: u16 = 7;
pub const TLV_IP_ADDRESS: u16 = 8;

pub const BRAND: &str = "Mikrotik";
pub const DEFAULT_MODEL: &str = "RouterBoard Series";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MndpRecord {
    pub name: Option<String>,
    pub version: Option<String>,
    pub device_type: Option<String>,
    pub ip_address: Option<String>,
}

impl MndpRecord {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.version.is_none()
            && self.device_type.is_none()
            && self.ip_address.is_none()
    }
}

/// Walk the TLV stream while at least a TLV header remains. A value that runs
/// past the payload ends parsing; fields read before it are kept.
pub fn parse(payload: &[u8]) -> Result<MndpRecord, DecodeError> {
    let mut record = MndpRecord::default();
    let mut offset = 0;

    while offset + TLV_HEADER_LEN <= payload.len() {
        let tlv_type = u16::from_be_bytes([payload[offset], payload[offset + 1]]);
        let length = u16::from_be_bytes([payload[offset + 2], payload[offset + 3]]) as usize;
        let start = offset + TLV_HEADER_LEN;

        if start + length > payload.len() {
            if record.is_empty() {
                return Err(DecodeError::MalformedTlv {
                    protocol: "MNDP",
                    offset,
                });
            }
            break;
        }

        let value = text_value(&payload[start..start + length]);
        match tlv_type {
            TLV_NAME => record.name = value,
            TLV_VERSION => record.version = value,
            TLV_DEVICE_TYPE => record.device_type = value,
            TLV_IP_ADDRESS => record.ip_address = value,
            _ => {}
        }
        offset = start + length;
    }

    Ok(record)
}

/// A record needs a name or an address to describe a device. Our own probe
/// looping back through the capture carries neither.
pub fn decode(payload: &[u8], mac: MacKey, seen_at: DateTime<Utc>) -> Result<Device, DecodeError> {
    let record = parse(payload)?;
    if record.name.is_none() && record.ip_address.is_none() {
        return Err(DecodeError::EmptyRecord("MNDP"));
    }

    let mut device = Device::new(mac, BRAND, DEFAULT_MODEL, DiscoveryMethod::Mndp, seen_at);
    device.name = record.name.unwrap_or_else(|| default_name(BRAND));
    device.ip_address = record.ip_address;
    device.version = record.version;
    device.device_type = record.device_type;
    Ok(device)
}

fn text_value(value: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(value);
    let text = text.trim_matches('\0');
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
