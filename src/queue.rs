//! Fixed-capacity FIFO between the capture thread and the decoder workers.
//! Producers never block; consumers wait briefly and learn about end-of-stream
//! once the queue is closed and drained.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::packet::RawFrame;

#[derive(Debug)]
pub enum TryAddError {
    /// Queue at capacity. The frame is handed back to the caller.
    Full(RawFrame),
    Closed(RawFrame),
}

/// Outcome of a consumer take.
#[derive(Debug)]
pub enum Take {
    Frame(RawFrame),
    /// Nothing arrived within the timeout.
    Empty,
    /// Closed and drained; no more frames will arrive.
    Closed,
}

pub struct BoundedFrameQueue {
    sender: Sender<RawFrame>,
    receiver: Receiver<RawFrame>,
    capacity: usize,
    closed: AtomicBool,
}

impl BoundedFrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    pub fn try_add(&self, frame: RawFrame) -> Result<(), TryAddError> {
        if self.is_closed() {
            return Err(TryAddError::Closed(frame));
        }
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(frame) => TryAddError::Full(frame),
            TrySendError::Disconnected(frame) => TryAddError::Closed(frame),
        })
    }

    pub fn take(&self, timeout: Duration) -> Take {
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => Take::Frame(frame),
            Err(RecvTimeoutError::Timeout) if self.is_closed() && self.receiver.is_empty() => {
                Take::Closed
            }
            Err(RecvTimeoutError::Timeout) => Take::Empty,
            Err(RecvTimeoutError::Disconnected) => Take::Closed,
        }
    }

    /// Wait up to `timeout` for a first frame, then drain whatever is already
    /// queued up to `limit` frames. Returns `None` once closed and drained.
    pub fn take_batch(&self, limit: usize, timeout: Duration) -> Option<Vec<RawFrame>> {
        let mut batch = Vec::new();
        match self.take(timeout) {
            Take::Frame(frame) => batch.push(frame),
            Take::Empty => return Some(batch),
            Take::Closed => return None,
        }
        while batch.len() < limit {
            match self.receiver.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Some(batch)
    }

    /// Refuse further frames. Consumers keep draining what is queued, then see `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
