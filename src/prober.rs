//! Active MNDP prober. Broadcasts a discovery request on a fixed interval so
//! MikroTik devices announce themselves; replies come back through capture.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::{Result, SnifferError};
use crate::packet::mndp::PROBE_PAYLOAD;
use crate::signal::StopSignal;

pub struct DiscoveryProber {
    interval: Duration,
    target: SocketAddr,
}

impl DiscoveryProber {
    pub fn new(interval: Duration, target: SocketAddr) -> Self {
        Self { interval, target }
    }

    fn bind_broadcast_socket() -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;
        Ok(UdpSocket::from_std(socket.into())?)
    }

    /// Send probes until `stop` fires. Returns the number of probes sent.
    /// Send failures are logged and the loop carries on.
    pub async fn run(self, stop: StopSignal) -> u64 {
        let socket = match Self::bind_broadcast_socket() {
            Ok(socket) => socket,
            Err(e) => {
                let e = SnifferError::TransientIo(format!("cannot open probe socket: {}", e));
                warn!(error = %e, "discovery prober disabled");
                return 0;
            }
        };

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent = 0u64;

        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = ticker.tick() => {
                    match socket.send_to(&PROBE_PAYLOAD, self.target).await {
                        Ok(_) => sent += 1,
                        Err(e) => warn!(destination = %self.target, error = %e, "probe send failed"),
                    }
                }
            }
        }

        debug!(sent, "discovery prober exiting");
        sent
    }

    pub fn spawn(self, stop: StopSignal) -> JoinHandle<u64> {
        tokio::spawn(self.run(stop))
    }
}
