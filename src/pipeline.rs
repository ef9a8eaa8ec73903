//! Per-frame processing shared by the worker pool and offline replay:
//! decode, publish the packet event, then reconcile with the registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, trace};

use crate::device::{Device, MacKey};
use crate::events::{Event, EventBus};
use crate::packet::RawFrame;
use crate::packet::decoder::{self, DecodedFrame};
use crate::registry::DeviceRegistry;
use crate::vendor::VendorDatabase;

#[derive(Default, Debug)]
pub struct PipelineCounters {
    decoded: AtomicU64,
    decode_errors: AtomicU64,
}

impl PipelineCounters {
    pub fn decoded(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct FramePipeline {
    vendors: Arc<VendorDatabase>,
    registry: Arc<DeviceRegistry>,
    bus: Arc<EventBus>,
    counters: Arc<PipelineCounters>,
    /// Registry generation this pipeline may create devices in; `None` is unbound.
    generation: Option<u64>,
}

impl FramePipeline {
    pub fn new(
        vendors: Arc<VendorDatabase>,
        registry: Arc<DeviceRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            vendors,
            registry,
            bus,
            counters: Arc::new(PipelineCounters::default()),
            generation: None,
        }
    }

    /// A copy that stops creating devices once the registry is cleared past
    /// `generation`. Counters stay shared.
    pub fn for_generation(&self, generation: u64) -> Self {
        Self {
            generation: Some(generation),
            ..self.clone()
        }
    }

    pub fn counters(&self) -> Arc<PipelineCounters> {
        self.counters.clone()
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Process one frame. Decode failures are counted and logged, never propagated.
    pub fn process(&self, frame: &RawFrame) {
        let decoded = match decoder::decode_frame(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                trace!(error = %e, "skipping undecodable frame");
                return;
            }
        };
        self.counters.decoded.fetch_add(1, Ordering::Relaxed);
        self.apply(decoded);
    }

    fn apply(&self, mut decoded: DecodedFrame) {
        if let Some(packet) = decoded.packet.take() {
            self.bus.broadcast(&Event::Packet(packet.into()));
        }

        match decoded.discovery.take() {
            Some(Ok(device)) => self.observe_protocol_device(device, &decoded),
            Some(Err(e)) => {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                debug!(mac = %decoded.source_mac, error = %e, "discovery frame rejected");
                self.observe_by_vendor(&decoded);
            }
            None => self.observe_by_vendor(&decoded),
        }
    }

    fn observe_protocol_device(&self, device: Device, decoded: &DecodedFrame) {
        let Some((stored, was_new)) = self.upsert(&decoded.source_mac, || device.clone()) else {
            return;
        };
        if was_new {
            self.announce(&stored);
            return;
        }
        if self.registry.refine(&device) {
            info!(
                mac = %decoded.source_mac,
                brand = %device.brand,
                method = %device.method,
                "device identity upgraded"
            );
        }
        let ip = device.ip_address.as_deref().or(decoded.source_ip.as_deref());
        self.registry
            .touch(&decoded.source_mac, decoded.seen_at, ip, None);
    }

    /// Fallback for frames without a protocol banner: guess from the MAC prefix,
    /// but only for MACs that have not produced a device yet.
    fn observe_by_vendor(&self, decoded: &DecodedFrame) {
        let ip = decoded.source_ip.as_deref();
        if self.registry.touch(&decoded.source_mac, decoded.seen_at, ip, None) {
            return;
        }
        let Some(candidate) =
            decoder::vendor_candidate(&self.vendors, &decoded.source_mac, ip, decoded.seen_at)
        else {
            return;
        };
        let Some((stored, was_new)) = self.upsert(&decoded.source_mac, || candidate) else {
            return;
        };
        if was_new {
            self.announce(&stored);
        } else {
            // Another worker created it between our touch and upsert.
            self.registry
                .touch(&decoded.source_mac, decoded.seen_at, ip, None);
        }
    }

    fn upsert<F>(&self, mac: &MacKey, constructor: F) -> Option<(Device, bool)>
    where
        F: FnOnce() -> Device,
    {
        match self.generation {
            Some(generation) => self.registry.upsert_in(generation, mac, constructor),
            None => Some(self.registry.upsert(mac, constructor)),
        }
    }

    fn announce(&self, device: &Device) {
        info!(
            mac = %device.mac,
            brand = %device.brand,
            name = %device.name,
            method = %device.method,
            "device discovered"
        );
        self.bus.broadcast(&Event::device(device));
    }
}
