//! Startup configuration: approved devices, dangerous countries, business
//! hours, and the traffic-anomaly threshold. Every loader falls back to a
//! documented default when its file is missing or unparsable.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Business hours as a half-open interval `[start, end)` of local-time
/// hours. Out-of-hours is true outside this interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    pub start: u8,
    pub end: u8,
}

impl Default for BusinessHours {
    fn default() -> Self {
        BusinessHours { start: 9, end: 17 }
    }
}

impl BusinessHours {
    /// True when `hour` falls outside `[start, end)`.
    pub fn is_out_of_hours(&self, hour: u8) -> bool {
        !(self.start <= hour && hour < self.end)
    }
}

/// Load a JSON array of MAC address strings, lowercased for
/// case-insensitive comparison. Missing or unparsable files yield an empty
/// set — an empty approved list means every device is unapproved, which is
/// the conservative default.
pub fn load_approved_macs(path: &Path) -> HashSet<String> {
    load_json_string_set(path)
}

/// Load a JSON array of ISO-3166-1 alpha-2 country codes, uppercased.
pub fn load_dangerous_countries(path: &Path) -> HashSet<String> {
    load_json_string_set(path)
        .into_iter()
        .map(|c| c.to_uppercase())
        .collect()
}

fn load_json_string_set(path: &Path) -> HashSet<String> {
    let Ok(text) = fs::read_to_string(path) else {
        return HashSet::new();
    };
    let Ok(values) = serde_json::from_str::<Vec<String>>(&text) else {
        return HashSet::new();
    };
    values.into_iter().map(|v| v.to_lowercase()).collect()
}

/// Dangerous protocol labels, matched case-insensitively against
/// `Observation::protocol`.
pub const DANGEROUS_PROTOCOLS: [&str; 3] = ["telnet", "ftp", "rdp"];

/// Ports considered dangerous regardless of protocol label.
pub const DANGEROUS_PORTS: [u16; 9] = [21, 23, 445, 2323, 3389, 5900, 5901, 5985, 5986];

/// Default traffic-anomaly spike threshold in bytes, used when no
/// configuration file overrides it.
pub const DEFAULT_SPIKE_THRESHOLD: u64 = 1_000_000;

/// A threshold-bearing config file read by the traffic anomaly detector.
/// A missing or unparsable file silently falls back to
/// [`DEFAULT_SPIKE_THRESHOLD`].
pub fn load_traffic_threshold(path: &Path) -> u64 {
    #[derive(serde::Deserialize)]
    struct ThresholdFile {
        traffic_threshold: Option<u64>,
    }
    fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str::<ThresholdFile>(&text).ok())
        .and_then(|f| f.traffic_threshold)
        .unwrap_or(DEFAULT_SPIKE_THRESHOLD)
}
