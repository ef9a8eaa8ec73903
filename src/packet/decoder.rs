//! Turns a raw frame into at most one device observation plus an optional
//! packet-observed event. Pure: no registry access, no I/O.

use chrono::{DateTime, Utc};
use pnet::packet::ethernet::EthernetPacket;

use super::{LINKTYPE_ETHERNET, PacketWrapper, RawFrame, cdp, mndp};
use crate::device::{Device, DiscoveryMethod, MacKey};
use crate::error::DecodeError;
use crate::vendor::{VendorDatabase, VendorMatch};

/// Summary of an IP packet, emitted for every IP frame regardless of whether
/// the sender is recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketObserved {
    pub source_ip: String,
    pub destination_ip: String,
    pub protocol: String,
    pub length: usize,
}

#[derive(Debug)]
pub struct DecodedFrame {
    pub source_mac: MacKey,
    pub seen_at: DateTime<Utc>,
    /// Source address from the IP header, if the frame carried one.
    pub source_ip: Option<String>,
    pub packet: Option<PacketObserved>,
    /// Outcome of a CDP or MNDP decode, when the frame was one.
    pub discovery: Option<Result<Device, DecodeError>>,
}

pub fn decode_frame(frame: &RawFrame) -> Result<DecodedFrame, DecodeError> {
    if frame.link_type != LINKTYPE_ETHERNET {
        return Err(DecodeError::UnsupportedLinkType(frame.link_type));
    }
    let ethernet =
        EthernetPacket::new(&frame.data).ok_or(DecodeError::Truncated(frame.data.len()))?;
    let source_mac = MacKey::from(ethernet.get_source());

    let mut decoded = DecodedFrame {
        source_mac: source_mac.clone(),
        seen_at: frame.timestamp,
        source_ip: None,
        packet: None,
        discovery: None,
    };

    if let Some(start) = cdp::tlv_start(&frame.data, ethernet.get_ethertype().0) {
        decoded.discovery = Some(Ok(cdp::decode(
            &frame.data,
            start,
            source_mac,
            frame.timestamp,
        )));
        return Ok(decoded);
    }

    let wrapper = PacketWrapper::new(&ethernet);
    if wrapper.is_ip() {
        let source_ip = wrapper.get_source_ip().unwrap_or_default();
        decoded.packet = Some(PacketObserved {
            source_ip: source_ip.clone(),
            destination_ip: wrapper.get_destination_ip().unwrap_or_default(),
            protocol: wrapper.get_header_protocol().unwrap_or_default(),
            length: frame.data.len(),
        });
        decoded.source_ip = Some(source_ip);

        if let Some(udp) = wrapper.get_udp()
            && udp.involves_port(mndp::MNDP_PORT)
        {
            decoded.discovery = Some(mndp::decode(&udp.payload, source_mac, frame.timestamp));
        }
    }

    Ok(decoded)
}

/// Minimal device guessed from the MAC prefix alone.
pub fn vendor_candidate(
    vendors: &VendorDatabase,
    mac: &MacKey,
    ip_address: Option<&str>,
    seen_at: DateTime<Utc>,
) -> Option<Device> {
    match vendors.lookup(mac.oui_prefix()) {
        VendorMatch::Matched { brand, model } => {
            let mut device = Device::new(mac.clone(), brand, model, DiscoveryMethod::Oui, seen_at);
            device.ip_address = ip_address.map(str::to_string);
            Some(device)
        }
        VendorMatch::NoMatch => None,
    }
}
