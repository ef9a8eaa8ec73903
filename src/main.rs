use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wisp_discovery::capture::{CaptureBackend, PcapBackend};
use wisp_discovery::events::{Event, EventBus};
use wisp_discovery::pipeline::FramePipeline;
use wisp_discovery::registry::DeviceRegistry;
use wisp_discovery::replay::replay_pcap_file;
use wisp_discovery::signal::StopSignal;
use wisp_discovery::vendor::VendorDatabase;
use wisp_discovery::{DiscoveryService, Result, SnifferConfig, SnifferError};

/// Discover wireless-ISP equipment on a local network segment.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Interface to capture on
    #[arg(short, long)]
    interface: Option<String>,

    /// Print the available capture interfaces and exit
    #[arg(short, long)]
    list_interfaces: bool,

    /// Replay a pcap file instead of capturing live
    #[arg(short, long, value_name = "FILE")]
    read: Option<PathBuf>,

    /// Vendor prefix database (JSON)
    #[arg(long, value_name = "PATH")]
    vendors: Option<PathBuf>,

    /// Also print a line for every observed IP packet
    #[arg(long)]
    packets: bool,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    queue_capacity: Option<usize>,

    #[arg(long, value_name = "MS")]
    probe_interval_ms: Option<u64>,

    #[arg(long, value_name = "SECS")]
    device_ttl_secs: Option<u64>,

    /// Capture filter expression
    #[arg(long)]
    filter: Option<String>,

    /// Do not put the interface in promiscuous mode
    #[arg(long)]
    no_promiscuous: bool,
}

impl Cli {
    fn apply(&self, mut config: SnifferConfig) -> SnifferConfig {
        if let Some(path) = &self.vendors {
            config.vendor_db_path = path.clone();
        }
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(ms) = self.probe_interval_ms {
            config.probe_interval = std::time::Duration::from_millis(ms);
        }
        if let Some(secs) = self.device_ttl_secs {
            config.device_ttl = std::time::Duration::from_secs(secs);
        }
        if let Some(filter) = &self.filter {
            config.capture_filter = filter.clone();
        }
        if self.no_promiscuous {
            config.promiscuous = false;
        }
        config.sanitized()
    }
}

fn print_event(event: &Event, include_packets: bool) {
    if matches!(event, Event::Packet(_)) && !include_packets {
        return;
    }
    match event.to_json() {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(error = %e, "failed to serialize event"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.apply(SnifferConfig::from_env());
    let backend: Arc<dyn CaptureBackend> = Arc::new(PcapBackend::new());

    if cli.list_interfaces {
        let interfaces = backend.interfaces()?;
        println!("{}", serde_json::to_string_pretty(&interfaces)?);
        return Ok(());
    }

    let vendors = Arc::new(VendorDatabase::load_or_empty(&config.vendor_db_path));

    if let Some(path) = cli.read.clone() {
        return replay(path, vendors, cli.packets).await;
    }

    let Some(interface) = cli.interface.clone() else {
        return Err(SnifferError::Configuration(
            "no interface given; use --interface or --list-interfaces".to_string(),
        ));
    };

    let shutdown = StopSignal::new();
    let handler_signal = shutdown.clone();
    ctrlc::set_handler(move || handler_signal.stop())
        .map_err(|e| SnifferError::Configuration(format!("cannot install Ctrl-C handler: {}", e)))?;

    let service = DiscoveryService::new(config, backend, vendors);
    let mut subscription = service.subscribe().await;
    service.start_scanning(&interface).await?;

    loop {
        tokio::select! {
            _ = shutdown.stopped() => break,
            event = subscription.receiver.recv() => match event {
                Some(event) => print_event(&event, cli.packets),
                None => break,
            },
        }
    }

    info!("shutting down");
    service.stop_scanning().await?;
    while let Ok(event) = subscription.receiver.try_recv() {
        print_event(&event, cli.packets);
    }
    info!(stats = ?service.stats(), "capture summary");
    Ok(())
}

async fn replay(path: PathBuf, vendors: Arc<VendorDatabase>, include_packets: bool) -> Result<()> {
    let bus = Arc::new(EventBus::new());
    let mut subscription = bus.subscribe();
    let pipeline = FramePipeline::new(vendors, Arc::new(DeviceRegistry::new()), bus);

    // The bus lives inside the pipeline; the stream ends once replay drops it.
    let replay = tokio::task::spawn_blocking(move || replay_pcap_file(&path, &pipeline));
    while let Some(event) = subscription.receiver.recv().await {
        print_event(&event, include_packets);
    }

    replay
        .await
        .map_err(|e| SnifferError::TransientIo(format!("replay task failed: {}", e)))??;
    Ok(())
}
