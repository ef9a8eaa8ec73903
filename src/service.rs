//! Control surface for a hosting layer (UI bridge, CLI). Wraps the controller
//! and announces lifecycle changes on the event bus.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::capture::{CaptureBackend, InterfaceInfo};
use crate::config::SnifferConfig;
use crate::controller::{CaptureStats, SnifferController};
use crate::error::Result;
use crate::events::{Event, EventBus, SUBSCRIBER_BUFFER, ScanStatus, Subscription};
use crate::vendor::VendorDatabase;

pub struct DiscoveryService {
    controller: SnifferController,
    bus: Arc<EventBus>,
}

impl DiscoveryService {
    pub fn new(
        config: SnifferConfig,
        backend: Arc<dyn CaptureBackend>,
        vendors: Arc<VendorDatabase>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let controller = SnifferController::new(config, backend, vendors, bus.clone());
        Self { controller, bus }
    }

    pub fn controller(&self) -> &SnifferController {
        &self.controller
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub async fn start_scanning(&self, interface: &str) -> Result<()> {
        self.controller.start_capture(interface).await?;
        self.bus.broadcast(&Event::status(ScanStatus::ScanningStarted));
        Ok(())
    }

    pub async fn stop_scanning(&self) -> Result<()> {
        self.controller.stop_capture().await?;
        self.bus.broadcast(&Event::status(ScanStatus::ScanningStopped));
        Ok(())
    }

    pub fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        self.controller.list_interfaces()
    }

    pub fn stats(&self) -> CaptureStats {
        self.controller.stats()
    }

    /// The first event on a new subscription is a `connected` status telling
    /// the subscriber whether a capture is already running.
    pub async fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let is_scanning = self.controller.is_running().await;
        // Fresh channel, cannot be full.
        let _ = sender.try_send(Event::connected(is_scanning));
        let id = self.bus.add_subscriber(sender);
        info!(is_scanning, "subscriber connected");
        Subscription { id, receiver }
    }
}
