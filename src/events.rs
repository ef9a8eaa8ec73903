//! Discovery, packet and status events, and the subscriber fan-out.
//!
//! Events serialize to the JSON shapes the presentation layer consumes:
//! `{"type": "device" | "packet" | "status", "data": {...}}`.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use crate::device::{Device, DiscoveryMethod};
use crate::packet::decoder::PacketObserved;

/// Per-subscriber buffer. A subscriber that falls this far behind misses events.
pub const SUBSCRIBER_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Event {
    Device(DeviceEvent),
    Packet(PacketEvent),
    Status(StatusEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    pub brand: String,
    pub ip_address: String,
    pub mac_address: String,
    pub name: String,
    pub discovery_method: DiscoveryMethod,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl From<&Device> for DeviceEvent {
    fn from(device: &Device) -> Self {
        DeviceEvent {
            brand: device.brand.clone(),
            ip_address: device.ip_address.clone().unwrap_or_default(),
            mac_address: device.mac.to_display(),
            name: device.name.clone(),
            discovery_method: device.method,
            model: device.model.clone(),
            device_type: device.device_type.clone(),
            version: device.version.clone(),
        }
    }
}

/// Only the source address goes over the wire; the rest is for in-process consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketEvent {
    #[serde(rename = "sourceIP")]
    pub source_ip: String,
    #[serde(skip_serializing)]
    pub destination_ip: String,
    #[serde(skip_serializing)]
    pub protocol: String,
    #[serde(skip_serializing)]
    pub length: usize,
}

impl From<PacketObserved> for PacketEvent {
    fn from(packet: PacketObserved) -> Self {
        PacketEvent {
            source_ip: packet.source_ip,
            destination_ip: packet.destination_ip,
            protocol: packet.protocol,
            length: packet.length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    ScanningStarted,
    ScanningStopped,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_scanning: Option<bool>,
}

impl Event {
    pub fn device(device: &Device) -> Self {
        Event::Device(device.into())
    }

    pub fn status(status: ScanStatus) -> Self {
        Event::Status(StatusEvent {
            status,
            is_scanning: None,
        })
    }

    pub fn connected(is_scanning: bool) -> Self {
        Event::Status(StatusEvent {
            status: ScanStatus::Connected,
            is_scanning: Some(is_scanning),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Event>,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<(SubscriberId, mpsc::Sender<Event>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.add_subscriber(sender);
        Subscription { id, receiver }
    }

    pub fn add_subscriber(&self, sender: mpsc::Sender<Event>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, sender));
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(existing, _)| *existing != id);
    }

    /// Deliver to every open subscriber without blocking. Subscribers whose
    /// receiver is gone are pruned.
    pub fn broadcast(&self, event: &Event) {
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            for (id, sender) in subscribers.iter() {
                match sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => trace!(subscriber = id.0, "subscriber lagging, event skipped"),
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }
        if !closed.is_empty() {
            debug!(count = closed.len(), "pruning closed subscribers");
            self.subscribers
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| !closed.contains(id));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
