use chrono::Utc;
use pnet::packet::ethernet::{EthernetPacket, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{MutableIpv4Packet, checksum};
use pnet::packet::udp::MutableUdpPacket;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capture::{CaptureBackend, CaptureHandle, InterfaceInfo};
use crate::error::{Result, SnifferError};
use crate::ingest::FrameIngestor;
use crate::packet::RawFrame;
use crate::packet::cdp::{CDP_ETHERTYPE, SNAP_CDP_HEADER, TLV_OFFSET};

/// Builder for creating synthetic Ethernet frames for testing
pub struct PacketBuilder;

impl PacketBuilder {
    /// Ethernet II frame with an arbitrary ethertype and payload
    pub fn ethernet_frame(src_mac: &str, dst_mac: &str, ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut buffer = vec![0u8; 14 + payload.len()];

        let mut eth_packet = MutableEthernetPacket::new(&mut buffer[..]).unwrap();
        eth_packet.set_source(src_mac.parse::<MacAddr>().unwrap());
        eth_packet.set_destination(dst_mac.parse::<MacAddr>().unwrap());
        eth_packet.set_ethertype(pnet::packet::ethernet::EtherType(ethertype));

        buffer[14..].copy_from_slice(payload);
        buffer
    }

    /// IPv4/UDP frame carrying `payload`
    pub fn udp_packet(
        src_mac: &str,
        dst_mac: &str,
        src_ip: &str,
        dst_ip: &str,
        src_port: u16,
        dst_port: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        let udp_len = 8 + payload.len();
        let mut buffer = vec![0u8; 14 + 20 + udp_len];

        // Ethernet header
        let mut eth_packet = MutableEthernetPacket::new(&mut buffer[..]).unwrap();
        eth_packet.set_source(src_mac.parse::<MacAddr>().unwrap());
        eth_packet.set_destination(dst_mac.parse::<MacAddr>().unwrap());
        eth_packet.set_ethertype(pnet::packet::ethernet::EtherTypes::Ipv4);

        // IPv4 header
        let mut ip_packet = MutableIpv4Packet::new(&mut buffer[14..]).unwrap();
        ip_packet.set_version(4);
        ip_packet.set_header_length(5);
        ip_packet.set_total_length((20 + udp_len) as u16);
        ip_packet.set_ttl(64);
        ip_packet.set_next_level_protocol(IpNextHeaderProtocols::Udp);
        ip_packet.set_source(src_ip.parse::<Ipv4Addr>().unwrap());
        ip_packet.set_destination(dst_ip.parse::<Ipv4Addr>().unwrap());
        let checksum = checksum(&ip_packet.to_immutable());
        ip_packet.set_checksum(checksum);

        // UDP header
        let mut udp_packet = MutableUdpPacket::new(&mut buffer[34..]).unwrap();
        udp_packet.set_source(src_port);
        udp_packet.set_destination(dst_port);
        udp_packet.set_length(udp_len as u16);

        buffer[42..].copy_from_slice(payload);
        buffer
    }

    /// CDP frame: fixed header bytes up to the TLV offset, then `tlvs` verbatim
    pub fn cdp_frame(src_mac: &str, tlvs: &[u8]) -> Vec<u8> {
        let mut header = vec![0u8; TLV_OFFSET - 14];
        header[0] = 0x02; // CDP version
        header[1] = 180; // holdtime
        let mut payload = header;
        payload.extend_from_slice(tlvs);
        Self::ethernet_frame(src_mac, "01:00:0c:cc:cc:cc", CDP_ETHERTYPE, &payload)
    }

    /// CDP as switches send it: 802.3 length, LLC/SNAP, CDP header, TLVs
    pub fn cdp_snap_frame(src_mac: &str, tlvs: &[u8]) -> Vec<u8> {
        let mut payload = SNAP_CDP_HEADER.to_vec();
        payload.extend([0x02, 0xB4, 0x12, 0x34]); // version, TTL 180, checksum
        payload.extend_from_slice(tlvs);
        let length = payload.len() as u16;
        Self::ethernet_frame(src_mac, "01:00:0c:cc:cc:cc", length, &payload)
    }
}

/// CDP TLV; the length field counts the 4-byte header.
pub fn cdp_tlv(tlv_type: u16, value: &[u8]) -> Vec<u8> {
    let mut tlv = Vec::with_capacity(4 + value.len());
    tlv.extend(tlv_type.to_be_bytes());
    tlv.extend(((value.len() + 4) as u16).to_be_bytes());
    tlv.extend_from_slice(value);
    tlv
}

/// MNDP TLV; the length field counts the value only.
pub fn mndp_tlv(tlv_type: u16, value: &[u8]) -> Vec<u8> {
    let mut tlv = Vec::with_capacity(4 + value.len());
    tlv.extend(tlv_type.to_be_bytes());
    tlv.extend((value.len() as u16).to_be_bytes());
    tlv.extend_from_slice(value);
    tlv
}

pub fn raw_frame(data: Vec<u8>) -> RawFrame {
    RawFrame::ethernet(data, Utc::now())
}

/// Generate a synthetic pcap file for testing
pub fn create_test_pcap(packets: Vec<Vec<u8>>) -> std::io::Result<tempfile::NamedTempFile> {
    use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};

    let temp_file = tempfile::NamedTempFile::new()?;
    let file = temp_file.reopen()?;

    let mut pcap_writer = PcapWriter::with_header(
        file,
        PcapHeader {
            datalink: pcap_file::DataLink::ETHERNET,
            ..Default::default()
        },
    )
    .map_err(|e| std::io::Error::other(format!("Pcap write error: {}", e)))?;

    for (i, packet_data) in packets.iter().enumerate() {
        let packet = PcapPacket {
            timestamp: Duration::from_secs(1700000000 + i as u64), // Synthetic timestamp
            orig_len: packet_data.len() as u32,
            data: std::borrow::Cow::Borrowed(packet_data),
        };
        pcap_writer
            .write_packet(&packet)
            .map_err(|e| std::io::Error::other(format!("Packet write error: {}", e)))?;
    }

    Ok(temp_file)
}

/// Observable side effects of a `MockBackend`.
#[derive(Default, Debug)]
pub struct MockCounters {
    pub opened: AtomicUsize,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub closed: AtomicUsize,
    pub filters: Mutex<Vec<String>>,
}

/// In-memory capture backend. Started handles replay `frames` in a loop
/// until stopped.
pub struct MockBackend {
    pub interfaces: Vec<String>,
    pub privileged: bool,
    pub fail_filter: bool,
    pub frames: Vec<Vec<u8>>,
    /// How long `stop` blocks before delivery ceases.
    pub stop_delay: Option<Duration>,
    pub counters: Arc<MockCounters>,
}

impl MockBackend {
    pub fn new(interfaces: &[&str], frames: Vec<Vec<u8>>) -> Self {
        Self {
            interfaces: interfaces.iter().map(|name| name.to_string()).collect(),
            privileged: true,
            fail_filter: false,
            frames,
            stop_delay: None,
            counters: Arc::new(MockCounters::default()),
        }
    }
}

impl CaptureBackend for MockBackend {
    fn interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        Ok(self
            .interfaces
            .iter()
            .map(|name| InterfaceInfo {
                name: name.clone(),
                description: Some(format!("mock {}", name)),
            })
            .collect())
    }

    fn has_capture_privilege(&self) -> bool {
        self.privileged
    }

    fn open(
        &self,
        interface: &str,
        _promiscuous: bool,
        _read_timeout_ms: i32,
    ) -> Result<Box<dyn CaptureHandle>> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockHandle {
            interface: interface.to_string(),
            fail_filter: self.fail_filter,
            frames: self.frames.clone(),
            stop_delay: self.stop_delay,
            counters: self.counters.clone(),
            running: Arc::new(AtomicBool::new(false)),
            delivery: None,
        }))
    }
}

pub struct MockHandle {
    interface: String,
    fail_filter: bool,
    frames: Vec<Vec<u8>>,
    stop_delay: Option<Duration>,
    counters: Arc<MockCounters>,
    running: Arc<AtomicBool>,
    delivery: Option<std::thread::JoinHandle<()>>,
}

impl CaptureHandle for MockHandle {
    fn set_filter(&mut self, filter: &str) -> Result<()> {
        if self.fail_filter {
            return Err(SnifferError::capture_open(&self.interface, "bad filter"));
        }
        self.counters.filters.lock().unwrap().push(filter.to_string());
        Ok(())
    }

    fn start(&mut self, ingestor: FrameIngestor) -> Result<()> {
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let frames = self.frames.clone();
        self.delivery = Some(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                for frame in &frames {
                    ingestor.on_frame(raw_frame(frame.clone()));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(delay) = self.stop_delay {
            std::thread::sleep(delay);
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.delivery.take() {
            handle.join().unwrap();
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn close(mut self: Box<Self>) {
        self.stop();
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

mod tests {
    use super::*;

    #[test]
    fn test_udp_packet_creation() {
        let packet = PacketBuilder::udp_packet(
            "00:11:22:33:44:55",
            "aa:bb:cc:dd:ee:ff",
            "192.168.1.100",
            "8.8.8.8",
            54321,
            53,
            b"udp_data",
        );

        let eth = EthernetPacket::new(&packet).unwrap();
        assert_eq!(eth.get_source().to_string(), "00:11:22:33:44:55");
        assert_eq!(eth.get_destination().to_string(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(packet.len(), 50);
    }

    #[test]
    fn test_cdp_frame_layout() {
        let tlv = cdp_tlv(1, b"R1");
        assert_eq!(tlv, vec![0x00, 0x01, 0x00, 0x06, b'R', b'1']);

        let frame = PacketBuilder::cdp_frame("00:11:22:33:44:55", &tlv);
        assert_eq!(frame.len(), TLV_OFFSET + tlv.len());
        assert_eq!(&frame[12..14], &[0x20, 0x00]);
        assert_eq!(&frame[TLV_OFFSET..], &tlv[..]);
    }

    #[test]
    fn test_pcap_creation() {
        let packets = vec![
            PacketBuilder::udp_packet(
                "00:11:22:33:44:55",
                "aa:bb:cc:dd:ee:ff",
                "192.168.1.100",
                "8.8.4.4",
                54323,
                53,
                b"query",
            ),
            PacketBuilder::cdp_frame("00:11:22:33:44:55", &cdp_tlv(1, b"R1")),
        ];

        let pcap_file = create_test_pcap(packets).unwrap();
        assert!(pcap_file.path().exists());
    }
}
