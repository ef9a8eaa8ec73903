//! Offline replay. Runs a saved capture file through the same per-frame
//! pipeline as live capture, without the queue or the prober.

use std::path::Path;

use pcap::Capture;
use tracing::{debug, info};

use crate::capture::frame_from_packet;
use crate::error::{Result, SnifferError};
use crate::pipeline::FramePipeline;

/// Process every frame in `file_path`. Returns the number of frames read.
pub fn replay_pcap_file(file_path: impl AsRef<Path>, pipeline: &FramePipeline) -> Result<usize> {
    let file_path = file_path.as_ref();
    info!(file = %file_path.display(), "replaying capture file");

    let mut cap = Capture::from_file(file_path).map_err(|e| {
        SnifferError::Io(std::io::Error::other(format!(
            "failed to open pcap file {}: {}",
            file_path.display(),
            e
        )))
    })?;
    let link_type = cap.get_datalink().0;

    let mut frame_count = 0;
    while let Ok(packet) = cap.next_packet() {
        pipeline.process(&frame_from_packet(&packet, link_type));
        frame_count += 1;

        if frame_count % 1000 == 0 {
            debug!(frame_count, "replay progress");
        }
    }

    info!(
        frame_count,
        devices = pipeline.registry().len(),
        file = %file_path.display(),
        "replay finished"
    );
    Ok(frame_count)
}
