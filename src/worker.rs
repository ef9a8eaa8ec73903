//! Decoder worker pool. Each worker drains the frame queue in batches on the
//! blocking thread pool until the stop signal fires or the queue closes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::pipeline::FramePipeline;
use crate::queue::BoundedFrameQueue;
use crate::signal::StopSignal;

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub worker_count: usize,
    pub batch_size: usize,
    pub take_timeout: Duration,
}

pub struct DecoderWorkerPool {
    handles: Vec<JoinHandle<u64>>,
}

impl DecoderWorkerPool {
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        settings: WorkerSettings,
        queue: Arc<BoundedFrameQueue>,
        pipeline: FramePipeline,
        stop: StopSignal,
    ) -> Self {
        let handles = (0..settings.worker_count.max(1))
            .map(|worker_id| {
                let queue = queue.clone();
                let pipeline = pipeline.clone();
                let stop = stop.clone();
                tokio::task::spawn_blocking(move || {
                    run_worker(worker_id, settings, &queue, &pipeline, &stop)
                })
            })
            .collect();
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Hand over the join handles so the caller can await them under its own deadline.
    pub fn into_handles(self) -> Vec<JoinHandle<u64>> {
        self.handles
    }
}

/// Returns the number of frames this worker processed.
fn run_worker(
    worker_id: usize,
    settings: WorkerSettings,
    queue: &BoundedFrameQueue,
    pipeline: &FramePipeline,
    stop: &StopSignal,
) -> u64 {
    trace!(worker_id, "decoder worker started");
    let mut processed = 0u64;

    while !stop.is_stopped() {
        let Some(batch) = queue.take_batch(settings.batch_size, settings.take_timeout) else {
            break;
        };
        for frame in &batch {
            if stop.is_stopped() {
                break;
            }
            pipeline.process(frame);
            processed += 1;
        }
    }

    debug!(worker_id, processed, "decoder worker exiting");
    processed
}
