//! Live capture backed by `pcap` (libpcap) for interface discovery and the
//! actual capture loop.

use std::time::Duration;

use log::{info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{wall_clock_secs, CaptureSession, PacketSource};
use crate::error::CaptureError;

/// Default bound on the capture→analyzer channel: a bounded FIFO queue
/// couples the source and the analyzer.
const CHANNEL_CAPACITY: usize = 1024;

/// Packet source that opens a live libpcap capture handle on a named
/// interface (or the first non-loopback device when `None`).
pub struct LivePacketSource;

impl LivePacketSource {
    pub fn new() -> Self {
        LivePacketSource
    }

    /// Default interface: the first non-loopback device reported by libpcap.
    pub fn default_interface() -> anyhow::Result<String> {
        let devices = pcap::Device::list()?;
        devices
            .into_iter()
            .find(|d| d.name != "lo")
            .map(|d| d.name)
            .ok_or_else(|| anyhow::anyhow!("no capture-capable interface found"))
    }
}

impl Default for LivePacketSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PacketSource for LivePacketSource {
    async fn start(
        &self,
        interface: Option<String>,
        duration: Option<Duration>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> CaptureSession {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let handle: JoinHandle<Result<(), CaptureError>> = tokio::task::spawn_blocking(move || {
            let iface = match interface.or_else(|| Self::default_interface().ok()) {
                Some(i) => i,
                None => {
                    warn!("no interface available for capture");
                    return Ok(());
                }
            };
            info!("capturing on interface: {iface}");

            let mut cap = pcap::Capture::from_device(iface.as_str())?
                .promisc(true)
                .timeout(250)
                .open()?;

            let deadline = duration.map(|d| std::time::Instant::now() + d);

            loop {
                if cancel.is_cancelled() {
                    break;
                }
                if let Some(dl) = deadline {
                    if std::time::Instant::now() >= dl {
                        break;
                    }
                }
                match cap.next_packet() {
                    Ok(packet) => {
                        let ts = if packet.header.ts.tv_sec > 0 {
                            packet.header.ts.tv_sec as f64 + packet.header.ts.tv_usec as f64 * 1e-6
                        } else {
                            wall_clock_secs()
                        };
                        let obs = crate::parser::parse(packet.data, packet.header.len, ts);
                        if tx.blocking_send(obs).is_err() {
                            break;
                        }
                    }
                    Err(pcap::Error::TimeoutExpired) => continue,
                    Err(e) => {
                        warn!("capture error: {e}");
                        break;
                    }
                }
            }
            Ok(())
        });

        CaptureSession { rx, handle }
    }
}
