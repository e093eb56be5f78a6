use thiserror::Error;

/// Errors surfaced by the persistent store. The analyzer loop never sees
/// these propagate past a `save_*` call boundary without being logged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("background task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors from the packet source. Capture-side failures are contained by
/// the scheduler and never propagate into the analyzer.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("pcap error: {0}")]
    Pcap(#[from] pcap::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the blacklist feed updater. A failed update always leaves
/// the on-disk blacklist untouched.
#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("feed fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("feed parse failed: {0}")]
    Parse(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
