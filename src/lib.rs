//! Passive and active discovery of wireless-ISP equipment on a local segment.
//!
//! Frames are captured from a network interface, handed off through a bounded
//! queue to a pool of decoder workers, and recognized as devices by their CDP
//! or MNDP announcements or, failing that, by their MAC vendor prefix. An
//! active prober broadcasts MNDP requests so MikroTik gear answers quickly.

pub mod capture;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod events;
pub mod ingest;
pub mod packet;
pub mod pipeline;
pub mod prober;
pub mod queue;
pub mod registry;
pub mod replay;
pub mod service;
pub mod signal;
pub mod sweeper;
pub mod vendor;
pub mod worker;

#[cfg(test)]
pub mod test_utils;

pub use config::SnifferConfig;
pub use controller::{CapturePhase, CaptureStats, SnifferController};
pub use error::{DecodeError, Result, SnifferError};
pub use events::Event;
pub use service::DiscoveryService;
