//! Packet sources: abstract producers of raw captured frames.
//!
//! A [`PacketSource`] is a producer returning an input channel and a cancel
//! handle on `start`.

mod live;

pub use live::LivePacketSource;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::CaptureError;
use crate::observation::Observation;

/// A running capture session: the channel parsed observations arrive on
/// (parsing happens inline in the capture loop), and the handle used to
/// await completion. Cancellation is cooperative — stop is signalled
/// externally and this task observes it.
pub struct CaptureSession {
    pub rx: mpsc::Receiver<Observation>,
    pub handle: JoinHandle<Result<(), CaptureError>>,
}

/// Abstract capability for producing a bounded stream of already-parsed
/// observations. Implementations are injected into the Scheduler so the
/// dynamic-scan pipeline can be tested without real packet capture.
#[async_trait::async_trait]
pub trait PacketSource: Send + Sync {
    /// Start capturing on `interface`, bounded by `duration` (`None` means
    /// run until the returned task is aborted) or by the external
    /// `cancel` signal, whichever comes first.
    async fn start(
        &self,
        interface: Option<String>,
        duration: Option<std::time::Duration>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> CaptureSession;
}

/// Timestamp to stamp an [`Observation`] with when a source did not
/// capture one: the current wall clock.
pub fn wall_clock_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
