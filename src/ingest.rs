//! Capture-arrival callback. Runs on the capture source's own thread and only
//! ever performs a non-blocking push.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::packet::RawFrame;
use crate::queue::{BoundedFrameQueue, TryAddError};

#[derive(Default, Debug)]
pub struct IngestCounters {
    received: AtomicU64,
    dropped: AtomicU64,
}

impl IngestCounters {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct FrameIngestor {
    queue: Arc<BoundedFrameQueue>,
    counters: Arc<IngestCounters>,
}

impl FrameIngestor {
    pub fn new(queue: Arc<BoundedFrameQueue>) -> Self {
        Self {
            queue,
            counters: Arc::new(IngestCounters::default()),
        }
    }

    /// Hand a frame to the decoders. Returns false when it had to be dropped.
    pub fn on_frame(&self, frame: RawFrame) -> bool {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        match self.queue.try_add(frame) {
            Ok(()) => true,
            Err(TryAddError::Full(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    trace!(dropped, "frame queue full, dropping frames");
                }
                false
            }
            Err(TryAddError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn counters(&self) -> Arc<IngestCounters> {
        self.counters.clone()
    }
}
