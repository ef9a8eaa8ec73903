//! Cisco Discovery Protocol decoding.
//!
//! TLVs start at a fixed offset that depends on the encapsulation. Each TLV is a 2-byte type, a
//! 2-byte length that counts the 4-byte TLV header itself, then the value.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::device::{Device, DiscoveryMethod, MacKey, default_name};

pub const CDP_ETHERTYPE: u16 = 0x2000;

/// First TLV byte of an Ethernet II (ethertype 0x2000) frame.
pub const TLV_OFFSET: usize = 22;

/// First TLV byte of an 802.3 LLC/SNAP frame: Ethernet header, SNAP header,
/// then the 4-byte CDP header (version, TTL, checksum).
pub const SNAP_TLV_OFFSET: usize = 26;

const TLV_HEADER_LEN: usize = 4;

/// 802.2 LLC + SNAP header carrying the Cisco OUI and the CDP protocol id.
pub const SNAP_CDP_HEADER: [u8; 8] = [0xAA, 0xAA, 0x03, 0x00, 0x00, 0x0C, 0x20, 0x00];
const SNAP_OFFSET: usize = 14;

pub const TLV_DEVICE_ID: u16 = 1;
pub const TLV_CAPABILITIES: u16 = 5;
pub const TLV_VERSION: u16 = 6;

pub const DEFAULT_MODEL: &str = "Cisco Device";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CdpRecord {
    pub name: Option<String>,
    pub device_type: Option<String>,
    pub version: Option<String>,
}

/// Where the TLV stream starts, or `None` if this is not a CDP frame.
/// Ethertype 0x2000, or an 802.3 length field followed by the CDP SNAP header.
pub fn tlv_start(frame: &[u8], ethertype: u16) -> Option<usize> {
    if ethertype == CDP_ETHERTYPE {
        return Some(TLV_OFFSET);
    }
    let snap = ethertype <= 1500
        && frame
            .get(SNAP_OFFSET..SNAP_OFFSET + SNAP_CDP_HEADER.len())
            .is_some_and(|header| header == SNAP_CDP_HEADER);
    snap.then_some(SNAP_TLV_OFFSET)
}

/// Walk the TLV stream from `start`. Parsing stops at the first TLV whose
/// length is below the header size or runs past the frame; fields read before
/// that are kept.
pub fn parse(frame: &[u8], start: usize) -> CdpRecord {
    let mut record = CdpRecord::default();
    let mut offset = start;

    while offset + TLV_HEADER_LEN <= frame.len() {
        let tlv_type = u16::from_be_bytes([frame[offset], frame[offset + 1]]);
        let length = u16::from_be_bytes([frame[offset + 2], frame[offset + 3]]) as usize;

        if length < TLV_HEADER_LEN || offset + length > frame.len() {
            trace!(offset, length, "CDP TLV stream ends early");
            break;
        }

        let value = &frame[offset + TLV_HEADER_LEN..offset + length];
        match tlv_type {
            TLV_DEVICE_ID => record.name = ascii_value(value),
            TLV_CAPABILITIES => record.device_type = ascii_value(value),
            TLV_VERSION => record.version = ascii_value(value),
            _ => {}
        }
        offset += length;
    }

    record
}

/// Brand inferred from the advertised device name.
pub fn brand_for_name(name: Option<&str>) -> &'static str {
    let Some(name) = name.map(|n| n.to_ascii_lowercase()) else {
        return "Unknown";
    };
    if name.contains("ubnt") {
        "Ubiquiti"
    } else if name.contains("cisco") {
        "Cisco"
    } else {
        "Unknown"
    }
}

/// Every CDP frame describes a neighbor, even one whose TLVs carry no name.
pub fn decode(frame: &[u8], start: usize, mac: MacKey, seen_at: DateTime<Utc>) -> Device {
    let record = parse(frame, start);
    let brand = brand_for_name(record.name.as_deref());
    let mut device = Device::new(mac, brand, DEFAULT_MODEL, DiscoveryMethod::Cdp, seen_at);
    device.name = record.name.unwrap_or_else(|| default_name(brand));
    device.device_type = record.device_type;
    device.version = record.version;
    device
}

/// Non-ASCII bytes become '?', trailing NULs are dropped, empty values are absent.
fn ascii_value(value: &[u8]) -> Option<String> {
    let text: String = value
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();
    let text = text.trim_matches('\0');
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{PacketBuilder, cdp_tlv};

    const SRC: &str = "aa:bb:cc:dd:ee:ff";

    fn parse_tlvs(tlvs: &[u8]) -> CdpRecord {
        parse(&PacketBuilder::cdp_frame(SRC, tlvs), TLV_OFFSET)
    }

    #[test]
    fn test_round_trip_fields() {
        let cases = [
            ("UBNT-Device", "Router", "v6.5.2"),
            ("cisco-sw01", "Switch IGMP", "Cisco IOS 15.2"),
            ("x", "y", "z"),
        ];
        for (name, device_type, version) in cases {
            let mut tlvs = cdp_tlv(TLV_DEVICE_ID, name.as_bytes());
            tlvs.extend(cdp_tlv(TLV_CAPABILITIES, device_type.as_bytes()));
            tlvs.extend(cdp_tlv(TLV_VERSION, version.as_bytes()));

            let record = parse_tlvs(&tlvs);
            assert_eq!(record.name.as_deref(), Some(name));
            assert_eq!(record.device_type.as_deref(), Some(device_type));
            assert_eq!(record.version.as_deref(), Some(version));
        }
    }

    #[test]
    fn test_unknown_tlvs_skipped() {
        let mut tlvs = cdp_tlv(2, &[1, 2, 3, 4, 5]);
        tlvs.extend(cdp_tlv(TLV_DEVICE_ID, b"UBNT-Device"));
        tlvs.extend(cdp_tlv(3, b"eth0"));

        let record = parse_tlvs(&tlvs);
        assert_eq!(record.name.as_deref(), Some("UBNT-Device"));
        assert!(record.version.is_none());
    }

    #[test]
    fn test_invalid_length_stops_parsing() {
        let mut tlvs = cdp_tlv(TLV_DEVICE_ID, b"Cisco-R1");
        // Length 2 is below the TLV header size
        tlvs.extend([0x00, 0x06, 0x00, 0x02]);
        tlvs.extend(cdp_tlv(TLV_CAPABILITIES, b"never read"));

        let record = parse_tlvs(&tlvs);
        assert_eq!(record.name.as_deref(), Some("Cisco-R1"));
        assert!(record.device_type.is_none());
    }

    #[test]
    fn test_overrunning_first_tlv_still_yields_device() {
        let frame = PacketBuilder::cdp_frame(SRC, &[0x00, 0x01, 0x00, 0x40, b'a', b'b']);
        assert_eq!(parse(&frame, TLV_OFFSET), CdpRecord::default());

        let device = decode(&frame, TLV_OFFSET, SRC.parse().unwrap(), Utc::now());
        assert_eq!(device.brand, "Unknown");
        assert_eq!(device.name, "Unknown Device");
        assert_eq!(device.method, DiscoveryMethod::Cdp);
    }

    #[test]
    fn test_port_id_only_frame_is_unknown_cdp_device() {
        let frame = PacketBuilder::cdp_frame(SRC, &cdp_tlv(3, b"GigabitEthernet0/1"));
        let device = decode(&frame, TLV_OFFSET, SRC.parse().unwrap(), Utc::now());

        assert_eq!(device.brand, "Unknown");
        assert_eq!(device.name, "Unknown Device");
        assert_eq!(device.model, DEFAULT_MODEL);
        assert_eq!(device.method, DiscoveryMethod::Cdp);
        assert!(device.version.is_none());
    }

    #[test]
    fn test_short_frame_parses_empty() {
        assert_eq!(parse(&[0u8; 20], TLV_OFFSET), CdpRecord::default());
    }

    #[test]
    fn test_brand_inference() {
        assert_eq!(brand_for_name(Some("ubnt-ap")), "Ubiquiti");
        assert_eq!(brand_for_name(Some("My-CISCO-switch")), "Cisco");
        assert_eq!(brand_for_name(Some("router")), "Unknown");
        assert_eq!(brand_for_name(None), "Unknown");
    }

    #[test]
    fn test_decode_ubnt_device() {
        let frame = PacketBuilder::cdp_frame(SRC, &cdp_tlv(TLV_DEVICE_ID, b"UBNT-Device"));
        let device = decode(&frame, TLV_OFFSET, SRC.parse().unwrap(), Utc::now());

        assert_eq!(device.brand, "Ubiquiti");
        assert_eq!(device.name, "UBNT-Device");
        assert_eq!(device.model, DEFAULT_MODEL);
        assert_eq!(device.method, DiscoveryMethod::Cdp);
        assert_eq!(device.mac.to_display(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_detects_snap_encapsulation() {
        let mut frame = vec![0u8; 30];
        frame[SNAP_OFFSET..SNAP_OFFSET + 8].copy_from_slice(&SNAP_CDP_HEADER);
        assert_eq!(tlv_start(&frame, 0x0010), Some(SNAP_TLV_OFFSET));
        assert_eq!(tlv_start(&frame, CDP_ETHERTYPE), Some(TLV_OFFSET));
        assert_eq!(tlv_start(&[0u8; 30], 0x0010), None);
        assert_eq!(tlv_start(&frame, 0x0800), None);
    }

    #[test]
    fn test_decode_snap_frame() {
        let mut tlvs = cdp_tlv(TLV_DEVICE_ID, b"UBNT-Device");
        tlvs.extend(cdp_tlv(TLV_VERSION, b"v8.7.1"));
        let frame = PacketBuilder::cdp_snap_frame(SRC, &tlvs);
        let length_field = u16::from_be_bytes([frame[12], frame[13]]);

        let start = tlv_start(&frame, length_field).unwrap();
        assert_eq!(start, SNAP_TLV_OFFSET);

        let device = decode(&frame, start, SRC.parse().unwrap(), Utc::now());
        assert_eq!(device.brand, "Ubiquiti");
        assert_eq!(device.name, "UBNT-Device");
        assert_eq!(device.version.as_deref(), Some("v8.7.1"));
    }

    #[test]
    fn test_non_ascii_replaced() {
        let tlvs = cdp_tlv(TLV_DEVICE_ID, &[b'R', 0xC3, b'1', 0x00, 0x00]);
        assert_eq!(parse_tlvs(&tlvs).name.as_deref(), Some("R?1"));
    }
}
