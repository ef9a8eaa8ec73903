//! Sniffer configuration. Built once (defaults, then environment, then CLI flags)
//! and passed by value to the controller; nothing reads global settings.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const MNDP_PORT: u16 = 5678;

/// BPF expression installed on the capture device. The trailing clause lets
/// 802.3/SNAP CDP frames through alongside IP and ARP traffic.
pub const DEFAULT_CAPTURE_FILTER: &str = "ip or arp or ether[20:2] = 0x2000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnifferConfig {
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub batch_size: usize,
    #[serde(with = "millis")]
    pub take_timeout: Duration,
    #[serde(with = "millis")]
    pub probe_interval: Duration,
    pub probe_target: SocketAddr,
    #[serde(with = "millis")]
    pub device_ttl: Duration,
    #[serde(with = "millis")]
    pub sweep_interval: Duration,
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,
    pub read_timeout_ms: i32,
    pub capture_filter: String,
    pub promiscuous: bool,
    pub vendor_db_path: PathBuf,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            worker_count: 8,
            batch_size: 200,
            take_timeout: Duration::from_millis(50),
            probe_interval: Duration::from_millis(500),
            probe_target: SocketAddr::from(([255, 255, 255, 255], MNDP_PORT)),
            device_ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(2),
            read_timeout_ms: 100,
            capture_filter: DEFAULT_CAPTURE_FILTER.to_string(),
            promiscuous: true,
            vendor_db_path: PathBuf::from("vendors.json"),
        }
    }
}

impl SnifferConfig {
    /// Defaults overlaid with any `WISP_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// ignored with a warning and the previous value is kept.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "WISP_QUEUE_CAPACITY", &mut self.queue_capacity);
        override_parsed(&lookup, "WISP_WORKERS", &mut self.worker_count);
        override_parsed(&lookup, "WISP_BATCH_SIZE", &mut self.batch_size);
        override_millis(&lookup, "WISP_TAKE_TIMEOUT_MS", &mut self.take_timeout);
        override_millis(&lookup, "WISP_PROBE_INTERVAL_MS", &mut self.probe_interval);
        override_parsed(&lookup, "WISP_PROBE_TARGET", &mut self.probe_target);
        override_secs(&lookup, "WISP_DEVICE_TTL_SECS", &mut self.device_ttl);
        override_secs(&lookup, "WISP_SWEEP_INTERVAL_SECS", &mut self.sweep_interval);
        override_millis(&lookup, "WISP_SHUTDOWN_TIMEOUT_MS", &mut self.shutdown_timeout);
        override_parsed(&lookup, "WISP_READ_TIMEOUT_MS", &mut self.read_timeout_ms);
        override_parsed(&lookup, "WISP_PROMISCUOUS", &mut self.promiscuous);
        if let Some(filter) = lookup("WISP_CAPTURE_FILTER") {
            self.capture_filter = filter;
        }
        if let Some(path) = lookup("WISP_VENDOR_DB") {
            self.vendor_db_path = PathBuf::from(path);
        }
        self.sanitized()
    }

    /// Clamp values that would stall the pipeline to their smallest useful size.
    pub fn sanitized(mut self) -> Self {
        self.queue_capacity = self.queue_capacity.max(1);
        self.worker_count = self.worker_count.max(1);
        self.batch_size = self.batch_size.max(1);
        // 0 makes libpcap block until a packet arrives.
        self.read_timeout_ms = self.read_timeout_ms.max(1);
        if self.take_timeout.is_zero() {
            self.take_timeout = Duration::from_millis(1);
        }
        if self.probe_interval.is_zero() {
            self.probe_interval = Duration::from_millis(500);
        }
        if self.sweep_interval.is_zero() {
            self.sweep_interval = Duration::from_secs(30);
        }
        self
    }
}

fn override_parsed<T, F>(lookup: &F, key: &str, target: &mut T)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "ignoring invalid configuration override"),
        }
    }
}

fn override_millis<F>(lookup: &F, key: &str, target: &mut Duration)
where
    F: Fn(&str) -> Option<String>,
{
    let mut ms = target.as_millis() as u64;
    override_parsed(lookup, key, &mut ms);
    *target = Duration::from_millis(ms);
}

fn override_secs<F>(lookup: &F, key: &str, target: &mut Duration)
where
    F: Fn(&str) -> Option<String>,
{
    let mut secs = target.as_secs();
    override_parsed(lookup, key, &mut secs);
    *target = Duration::from_secs(secs);
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
