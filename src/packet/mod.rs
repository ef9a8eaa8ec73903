pub mod cdp;
pub mod decoder;
pub mod mndp;

use chrono::{DateTime, Utc};
use pnet::packet::Packet;
use pnet::packet::ethernet::EtherTypes;
use pnet::packet::ethernet::EthernetPacket;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::UdpPacket;

/// DLT_EN10MB
pub const LINKTYPE_ETHERNET: i32 = 1;

const UDP_HEADER_LEN: usize = 8;

/// A captured frame as delivered by the capture source.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub timestamp: DateTime<Utc>,
    pub link_type: i32,
    pub data: Vec<u8>,
    pub captured_len: u32,
}

impl RawFrame {
    pub fn ethernet(data: Vec<u8>, timestamp: DateTime<Utc>) -> Self {
        let captured_len = data.len() as u32;
        Self {
            timestamp,
            link_type: LINKTYPE_ETHERNET,
            data,
            captured_len,
        }
    }
}

/// UDP header fields and payload lifted out of an IP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: Vec<u8>,
}

impl UdpDatagram {
    pub fn involves_port(&self, port: u16) -> bool {
        self.source_port == port || self.destination_port == port
    }
}

#[derive(Debug)]
enum PacketWrapper<'a> {
    Ipv4(Ipv4Packet<'a>),
    Ipv6(Ipv6Packet<'a>),
    Other,
}

impl<'a> PacketWrapper<'a> {
    fn new(packet: &'a EthernetPacket<'a>) -> PacketWrapper<'a> {
        match packet.get_ethertype() {
            EtherTypes::Ipv4 => Ipv4Packet::new(packet.payload())
                .map(PacketWrapper::Ipv4)
                .unwrap_or(PacketWrapper::Other),
            EtherTypes::Ipv6 => Ipv6Packet::new(packet.payload())
                .map(PacketWrapper::Ipv6)
                .unwrap_or(PacketWrapper::Other),
            _ => PacketWrapper::Other,
        }
    }

    fn is_ip(&self) -> bool {
        !matches!(self, PacketWrapper::Other)
    }

    fn get_source_ip(&self) -> Option<String> {
        match self {
            PacketWrapper::Ipv4(packet) => Some(packet.get_source().to_string()),
            PacketWrapper::Ipv6(packet) => Some(packet.get_source().to_string()),
            PacketWrapper::Other => None,
        }
    }

    fn get_destination_ip(&self) -> Option<String> {
        match self {
            PacketWrapper::Ipv4(packet) => Some(packet.get_destination().to_string()),
            PacketWrapper::Ipv6(packet) => Some(packet.get_destination().to_string()),
            PacketWrapper::Other => None,
        }
    }

    fn get_header_protocol(&self) -> Option<String> {
        match self {
            PacketWrapper::Ipv4(packet) => Some(format!("{}", packet.get_next_level_protocol())),
            PacketWrapper::Ipv6(packet) => Some(format!("{}", packet.get_next_header())),
            PacketWrapper::Other => None,
        }
    }

    fn get_udp(&self) -> Option<UdpDatagram> {
        let ip_payload = match self {
            PacketWrapper::Ipv4(packet)
                if packet.get_next_level_protocol() == IpNextHeaderProtocols::Udp =>
            {
                packet.payload()
            }
            PacketWrapper::Ipv6(packet) if packet.get_next_header() == IpNextHeaderProtocols::Udp => {
                packet.payload()
            }
            _ => return None,
        };
        let udp_packet = UdpPacket::new(ip_payload)?;
        // Ethernet padding can follow the datagram; trust the UDP length field.
        let declared = (udp_packet.get_length() as usize).saturating_sub(UDP_HEADER_LEN);
        let payload = udp_packet.payload();
        let payload = &payload[..declared.min(payload.len())];
        Some(UdpDatagram {
            source_port: udp_packet.get_source(),
            destination_port: udp_packet.get_destination(),
            payload: payload.to_vec(),
        })
    }
}
