//! Shared application state handed to every route via `web::Data`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lanwarden_core::scheduler::Scheduler;
use lanwarden_core::static_scan::Probe;
use lanwarden_core::store::Store;

pub struct AppState {
    pub store: Arc<Store>,
    pub scheduler: Arc<Scheduler>,
    pub probes: Vec<Arc<dyn Probe>>,
    pub probe_timeout: Duration,
    /// Global budget for a `/static_scan` request; exceeding it yields a
    /// 504 even though individual probes are each already bounded by
    /// `probe_timeout`.
    pub static_scan_global_timeout: Duration,
    pub reports_dir: PathBuf,
}
