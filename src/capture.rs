//! Capture source abstraction. The controller only talks to these traits, so
//! lifecycle logic can be exercised without a live interface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use pcap::{Active, Capture};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SnifferError};
use crate::ingest::FrameIngestor;
use crate::packet::RawFrame;

const SNAPLEN: i32 = 65535;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub description: Option<String>,
}

pub trait CaptureBackend: Send + Sync {
    fn interfaces(&self) -> Result<Vec<InterfaceInfo>>;

    /// Whether the process may open raw captures at all.
    fn has_capture_privilege(&self) -> bool;

    fn open(
        &self,
        interface: &str,
        promiscuous: bool,
        read_timeout_ms: i32,
    ) -> Result<Box<dyn CaptureHandle>>;
}

/// An opened capture. `start` begins delivering frames to the ingestor from a
/// thread owned by the handle; `stop` must not return until delivery has ceased.
pub trait CaptureHandle: Send {
    fn set_filter(&mut self, filter: &str) -> Result<()>;
    fn start(&mut self, ingestor: FrameIngestor) -> Result<()>;
    fn stop(&mut self);
    fn close(self: Box<Self>);
}

/// libpcap-backed capture.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcapBackend;

impl PcapBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for PcapBackend {
    fn interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        let devices = pcap::Device::list()
            .map_err(|e| SnifferError::TransientIo(format!("cannot enumerate interfaces: {}", e)))?;
        Ok(devices
            .into_iter()
            .map(|device| InterfaceInfo {
                name: device.name,
                description: device.desc,
            })
            .collect())
    }

    fn has_capture_privilege(&self) -> bool {
        use socket2::{Domain, Protocol, Socket, Type};
        Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok()
    }

    fn open(
        &self,
        interface: &str,
        promiscuous: bool,
        read_timeout_ms: i32,
    ) -> Result<Box<dyn CaptureHandle>> {
        let capture = Capture::from_device(interface)
            .map_err(|e| SnifferError::capture_open(interface, e))?
            .promisc(promiscuous)
            .timeout(read_timeout_ms)
            .snaplen(SNAPLEN)
            .open()
            .map_err(|e| SnifferError::capture_open(interface, e))?;
        info!(interface, promiscuous, "capture opened");
        Ok(Box::new(PcapHandle {
            interface: interface.to_string(),
            capture: Some(capture),
            running: Arc::new(AtomicBool::new(false)),
            delivery: None,
        }))
    }
}

struct PcapHandle {
    interface: String,
    /// Present until `start` moves it onto the delivery thread.
    capture: Option<Capture<Active>>,
    running: Arc<AtomicBool>,
    delivery: Option<JoinHandle<()>>,
}

impl CaptureHandle for PcapHandle {
    fn set_filter(&mut self, filter: &str) -> Result<()> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| SnifferError::capture_open(&self.interface, "capture already started"))?;
        capture
            .filter(filter, true)
            .map_err(|e| SnifferError::capture_open(&self.interface, e))
    }

    fn start(&mut self, ingestor: FrameIngestor) -> Result<()> {
        let mut capture = self
            .capture
            .take()
            .ok_or_else(|| SnifferError::capture_open(&self.interface, "capture already started"))?;
        let link_type = capture.get_datalink().0;
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let interface = self.interface.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("capture-{}", self.interface))
            .spawn(move || {
                let mut delivered = 0u64;
                while running.load(Ordering::SeqCst) {
                    match capture.next_packet() {
                        Ok(packet) => {
                            let frame = frame_from_packet(&packet, link_type);
                            ingestor.on_frame(frame);
                            delivered += 1;
                        }
                        Err(pcap::Error::TimeoutExpired) => continue,
                        Err(e) => {
                            warn!(interface = %interface, error = %e, "capture read failed");
                            break;
                        }
                    }
                }
                debug!(interface = %interface, delivered, "capture delivery stopped");
            });

        match spawned {
            Ok(handle) => {
                self.delivery = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(SnifferError::capture_open(&self.interface, e))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Bounded by the read timeout.
        if let Some(handle) = self.delivery.take()
            && handle.join().is_err()
        {
            warn!(interface = %self.interface, "capture thread panicked");
        }
    }

    fn close(mut self: Box<Self>) {
        self.stop();
        self.capture = None;
        info!(interface = %self.interface, "capture closed");
    }
}

/// Convert a libpcap record into an owned frame.
pub(crate) fn frame_from_packet(packet: &pcap::Packet<'_>, link_type: i32) -> RawFrame {
    let ts = packet.header.ts;
    let timestamp = DateTime::from_timestamp(ts.tv_sec as i64, (ts.tv_usec as u32) * 1000)
        .unwrap_or_else(Utc::now);
    RawFrame {
        timestamp,
        link_type,
        data: packet.data.to_vec(),
        captured_len: packet.header.caplen,
    }
}
