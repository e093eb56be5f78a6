//! Static-scan orchestrator: runs a fixed set of probes concurrently with
//! per-probe fault isolation and aggregates a risk score.

mod probes;

pub use probes::{DnsProbe, OsBannerProbe, PortsProbe};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

/// Default per-probe budget. A slow or hung probe never blocks the others.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The outcome of a single probe, always present in the report regardless
/// of whether the probe succeeded, timed out, or panicked.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub category: String,
    pub score: u32,
    pub details: serde_json::Value,
}

/// A single static-scan check. Probes are fast, blocking, local checks —
/// the orchestrator dispatches each with `spawn_blocking`, so `scan`
/// itself stays plain synchronous code. A probe must not panic in
/// practice, but the orchestrator isolates one that does regardless.
pub trait Probe: Send + Sync + 'static {
    fn category(&self) -> &'static str;
    fn scan(&self) -> ProbeOutcome;
}

#[derive(Debug, Clone, Serialize)]
pub struct StaticScanReport {
    pub findings: Vec<ProbeOutcome>,
    pub risk_score: u32,
}

/// The probe set and order a scan runs with `target`/`dns_domain` fixed at
/// construction: ports first, then the OS banner grab, then DNS
/// resolution, with a stable tail for whatever comes after.
pub fn default_probes(target: String, dns_domain: String) -> Vec<Arc<dyn Probe>> {
    vec![
        Arc::new(PortsProbe::new(target.clone())),
        Arc::new(OsBannerProbe::new(target, 22)),
        Arc::new(DnsProbe::new(dns_domain, "8.8.8.8".to_string())),
    ]
}

/// Runs every probe on the blocking pool, each bounded by
/// `per_probe_timeout`. Results are returned in the same order `probes`
/// was given in, regardless of which finished first. A probe that times
/// out keeps running on its blocking thread in the background; it is
/// never cancelled, only excluded from the report.
pub async fn run_all(probes: &[Arc<dyn Probe>], per_probe_timeout: Duration) -> StaticScanReport {
    let mut handles = Vec::with_capacity(probes.len());
    for probe in probes {
        let probe = Arc::clone(probe);
        let category = probe.category();
        handles.push((category, tokio::task::spawn_blocking(move || probe.scan())));
    }

    let mut findings = Vec::with_capacity(handles.len());
    for (category, handle) in handles {
        let outcome = match tokio::time::timeout(per_probe_timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_join_err)) => failed(category, "probe task panicked".to_string()),
            Err(_elapsed) => failed(category, "timeout".to_string()),
        };
        findings.push(outcome);
    }

    let risk_score = findings.iter().map(|f| f.score).sum();
    StaticScanReport { findings, risk_score }
}

fn failed(category: &str, error: String) -> ProbeOutcome {
    ProbeOutcome {
        category: category.to_string(),
        score: 0,
        details: json!({ "error": error }),
    }
}
