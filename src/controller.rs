//! Capture lifecycle orchestration. Owns the Idle/Starting/Running/Stopping
//! state machine and every per-session resource: capture handle, frame queue,
//! decoder workers, prober and sweeper.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::capture::{CaptureBackend, CaptureHandle, InterfaceInfo};
use crate::config::SnifferConfig;
use crate::error::{Result, SnifferError};
use crate::events::EventBus;
use crate::ingest::{FrameIngestor, IngestCounters};
use crate::pipeline::FramePipeline;
use crate::prober::DiscoveryProber;
use crate::queue::BoundedFrameQueue;
use crate::registry::DeviceRegistry;
use crate::signal::StopSignal;
use crate::sweeper::spawn_sweeper;
use crate::vendor::VendorDatabase;
use crate::worker::{DecoderWorkerPool, WorkerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePhase {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapturePhase::Idle => "idle",
            CapturePhase::Starting => "starting",
            CapturePhase::Running => "running",
            CapturePhase::Stopping => "stopping",
        };
        write!(f, "{}", name)
    }
}

/// Point-in-time counters for the current (or most recent) session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub frames_decoded: u64,
    pub decode_errors: u64,
    pub devices: usize,
    /// Whether the last stop released the capture and joined every task
    /// within the shutdown timeout. `None` until a session has stopped.
    pub clean_shutdown: Option<bool>,
}

struct CaptureSession {
    interface: String,
    handle: Box<dyn CaptureHandle>,
    queue: Arc<BoundedFrameQueue>,
    stop: StopSignal,
    workers: Vec<JoinHandle<u64>>,
    prober: JoinHandle<u64>,
    sweeper: JoinHandle<usize>,
}

pub struct SnifferController {
    config: SnifferConfig,
    backend: Arc<dyn CaptureBackend>,
    registry: Arc<DeviceRegistry>,
    pipeline: FramePipeline,
    phase: RwLock<CapturePhase>,
    session: Mutex<Option<CaptureSession>>,
    ingest: std::sync::Mutex<Option<Arc<IngestCounters>>>,
    clean_shutdown: std::sync::Mutex<Option<bool>>,
}

impl SnifferController {
    pub fn new(
        config: SnifferConfig,
        backend: Arc<dyn CaptureBackend>,
        vendors: Arc<VendorDatabase>,
        bus: Arc<EventBus>,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let pipeline = FramePipeline::new(vendors, registry.clone(), bus);
        Self {
            config: config.sanitized(),
            backend,
            registry,
            pipeline,
            phase: RwLock::new(CapturePhase::Idle),
            session: Mutex::new(None),
            ingest: std::sync::Mutex::new(None),
            clean_shutdown: std::sync::Mutex::new(None),
        }
    }

    pub async fn phase(&self) -> CapturePhase {
        *self.phase.read().await
    }

    pub async fn is_running(&self) -> bool {
        self.phase().await == CapturePhase::Running
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &SnifferConfig {
        &self.config
    }

    pub fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        self.backend.interfaces()
    }

    pub fn stats(&self) -> CaptureStats {
        let counters = self.pipeline.counters();
        let ingest = self
            .ingest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        CaptureStats {
            frames_received: ingest.as_ref().map_or(0, |c| c.received()),
            frames_dropped: ingest.as_ref().map_or(0, |c| c.dropped()),
            frames_decoded: counters.decoded(),
            decode_errors: counters.decode_errors(),
            devices: self.registry.len(),
            clean_shutdown: *self.clean_shutdown.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    async fn set_phase(&self, phase: CapturePhase) {
        let mut current = self.phase.write().await;
        let previous = *current;
        if previous != phase {
            debug!(from = %previous, to = %phase, "capture phase change");
            *current = phase;
        }
    }

    /// Start capturing on `interface`. A running session is stopped first.
    /// On failure the controller is back in `Idle` with nothing held open.
    pub async fn start_capture(&self, interface: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        if let Some(active) = session.take() {
            info!(from = %active.interface, to = interface, "restarting capture");
            self.teardown(active).await;
        }

        self.set_phase(CapturePhase::Starting).await;
        match self.launch(interface).await {
            Ok(started) => {
                *session = Some(started);
                self.set_phase(CapturePhase::Running).await;
                info!(interface, "capture running");
                Ok(())
            }
            Err(e) => {
                self.set_phase(CapturePhase::Idle).await;
                warn!(interface, error = %e, "capture failed to start");
                Err(e)
            }
        }
    }

    /// Stop the running session, if any. Stopping while idle is a no-op.
    pub async fn stop_capture(&self) -> Result<()> {
        if self.phase().await == CapturePhase::Stopping {
            return Err(SnifferError::AlreadyStopping);
        }
        let mut session = self.session.lock().await;
        match session.take() {
            Some(active) => {
                self.teardown(active).await;
                Ok(())
            }
            None => {
                debug!("stop requested while idle");
                Ok(())
            }
        }
    }

    async fn launch(&self, interface: &str) -> Result<CaptureSession> {
        let known = self.backend.interfaces()?;
        if !known.iter().any(|candidate| candidate.name == interface) {
            return Err(SnifferError::InterfaceNotFound(interface.to_string()));
        }
        if !self.backend.has_capture_privilege() {
            return Err(SnifferError::Permission);
        }

        let mut handle = self.backend.open(
            interface,
            self.config.promiscuous,
            self.config.read_timeout_ms,
        )?;
        if let Err(e) = handle.set_filter(&self.config.capture_filter) {
            handle.close();
            return Err(e);
        }

        let queue = Arc::new(BoundedFrameQueue::new(self.config.queue_capacity));
        self.registry.clear();
        let stop = StopSignal::new();

        let settings = WorkerSettings {
            worker_count: self.config.worker_count,
            batch_size: self.config.batch_size,
            take_timeout: self.config.take_timeout,
        };
        let pipeline = self.pipeline.for_generation(self.registry.generation());
        let workers = DecoderWorkerPool::spawn(settings, queue.clone(), pipeline, stop.clone());
        let prober = DiscoveryProber::new(self.config.probe_interval, self.config.probe_target)
            .spawn(stop.clone());
        let sweeper = spawn_sweeper(
            self.registry.clone(),
            self.config.device_ttl,
            self.config.sweep_interval,
            stop.clone(),
        );

        let ingestor = FrameIngestor::new(queue.clone());
        *self.ingest.lock().unwrap_or_else(|e| e.into_inner()) = Some(ingestor.counters());

        let mut session = CaptureSession {
            interface: interface.to_string(),
            handle,
            queue,
            stop,
            workers: workers.into_handles(),
            prober,
            sweeper,
        };
        if let Err(e) = session.handle.start(ingestor) {
            self.teardown(session).await;
            return Err(e);
        }
        Ok(session)
    }

    /// Running -> Stopping -> Idle. Stopping the capture source and joining
    /// the session's tasks share one `shutdown_timeout` deadline; past it the
    /// stragglers are abandoned and the registry is cleared regardless.
    async fn teardown(&self, session: CaptureSession) {
        self.set_phase(CapturePhase::Stopping).await;
        let CaptureSession {
            interface,
            mut handle,
            queue,
            stop,
            workers,
            prober,
            sweeper,
        } = session;
        let timeout_ms = self.config.shutdown_timeout.as_millis() as u64;
        let deadline = Instant::now() + self.config.shutdown_timeout;
        let mut clean = true;

        stop.stop();
        let stopping = tokio::task::spawn_blocking(move || {
            handle.stop();
            handle
        });
        let handle = match timeout_at(deadline, stopping).await {
            Ok(Ok(handle)) => Some(handle),
            Ok(Err(e)) => {
                warn!(interface = %interface, error = %e, "capture source failed to stop");
                clean = false;
                None
            }
            Err(_) => {
                // The blocking stop keeps running and drops the handle when it returns.
                warn!(interface = %interface, timeout_ms, "capture source did not stop in time");
                clean = false;
                None
            }
        };
        queue.close();

        let prober_abort = prober.abort_handle();
        let sweeper_abort = sweeper.abort_handle();
        let joined = timeout_at(deadline, async move {
            let processed: u64 = join_all(workers)
                .await
                .into_iter()
                .filter_map(|result| result.ok())
                .sum();
            let probes = prober.await.unwrap_or(0);
            let evicted = sweeper.await.unwrap_or(0);
            (processed, probes, evicted)
        })
        .await;

        match joined {
            Ok((processed, probes, evicted)) => {
                debug!(processed, probes, evicted, "capture tasks joined");
            }
            Err(_) => {
                // Blocking workers cannot be aborted; they exit on their next queue poll.
                warn!(
                    timeout_ms,
                    dropped_frames = queue.len(),
                    "capture tasks did not exit in time, forcing teardown"
                );
                prober_abort.abort();
                sweeper_abort.abort();
                clean = false;
            }
        }

        if let Some(handle) = handle {
            handle.close();
        }
        self.registry.clear();
        *self.clean_shutdown.lock().unwrap_or_else(|e| e.into_inner()) = Some(clean);
        self.set_phase(CapturePhase::Idle).await;
        info!(interface = %interface, clean, "capture stopped");
    }
}
