//! Error types for capture, decoding and lifecycle control.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnifferError>;

/// Errors surfaced by `StartCapture`/`StopCapture` and by configuration loading.
#[derive(Error, Debug)]
pub enum SnifferError {
    /// Vendor database missing or corrupt. Never fatal: OUI matching degrades to no match.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("packet capture requires elevated privileges (run as root or grant CAP_NET_RAW)")]
    Permission,

    #[error("network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("failed to open capture on '{interface}': {reason}")]
    CaptureOpen { interface: String, reason: String },

    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    #[error("capture is already stopping")]
    AlreadyStopping,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SnifferError {
    pub fn capture_open(interface: &str, reason: impl std::fmt::Display) -> Self {
        SnifferError::CaptureOpen {
            interface: interface.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Per-frame decode failure. Logged and dropped inside the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short ({0} bytes)")]
    Truncated(usize),

    #[error("unsupported link-layer type {0}")]
    UnsupportedLinkType(i32),

    #[error("malformed {protocol} TLV at offset {offset}")]
    MalformedTlv {
        protocol: &'static str,
        offset: usize,
    },

    #[error("{0} record carried no identity fields")]
    EmptyRecord(&'static str),
}
