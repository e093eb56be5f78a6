//! Per-source traffic-spike / sustained-activity detector.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

const MAX_SAMPLES: usize = 10;
const CONTINUOUS_DURATION: Duration = Duration::from_secs(60);
const CONTINUOUS_GAP: Duration = Duration::from_secs(10);

struct SourceStats {
    history: VecDeque<u64>,
    total: u64,
    count: u64,
    start_time: f64,
    last_seen: f64,
}

impl SourceStats {
    fn new(now: f64) -> Self {
        SourceStats {
            history: VecDeque::with_capacity(MAX_SAMPLES),
            total: 0,
            count: 0,
            start_time: now,
            last_seen: now,
        }
    }

    fn reset(&mut self, now: f64) {
        self.history.clear();
        self.total = 0;
        self.count = 0;
        self.start_time = now;
    }

    fn push(&mut self, size: u64, now: f64) {
        if self.history.len() == MAX_SAMPLES {
            self.history.pop_front();
        }
        self.history.push_back(size);
        self.total += size;
        self.count += 1;
        self.last_seen = now;
    }
}

/// Owns the per-source accumulators for exactly one analyzer session.
/// This state is never shared across sessions.
pub struct TrafficAnomalyTracker {
    threshold: u64,
    stats: HashMap<String, SourceStats>,
}

impl TrafficAnomalyTracker {
    pub fn new(threshold: u64) -> Self {
        TrafficAnomalyTracker {
            threshold,
            stats: HashMap::new(),
        }
    }

    /// Record an observation of `size` bytes for `key` at time `now`
    /// (seconds since epoch), returning whether it constitutes an anomaly.
    pub fn observe(&mut self, key: &str, size: u64, now: f64) -> bool {
        let entry = self
            .stats
            .entry(key.to_string())
            .or_insert_with(|| SourceStats::new(now));

        if now - entry.last_seen > CONTINUOUS_GAP.as_secs_f64() {
            entry.reset(now);
        }
        entry.push(size, now);

        if now - entry.start_time > CONTINUOUS_DURATION.as_secs_f64() {
            return true;
        }

        let latest = *entry.history.back().unwrap();
        if entry.count == 1 {
            return latest > self.threshold;
        }
        let sum_previous = entry.total - latest;
        let mean_previous = sum_previous as f64 / (entry.count - 1) as f64;
        (latest as f64) > mean_previous + self.threshold as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_over_threshold_is_anomaly() {
        let mut tracker = TrafficAnomalyTracker::new(1_000_000);
        assert!(tracker.observe("1.1.1.1", 2_000_000, 0.0));
    }

    #[test]
    fn single_sample_under_threshold_is_not_anomaly() {
        let mut tracker = TrafficAnomalyTracker::new(1_000_000);
        assert!(!tracker.observe("1.1.1.1", 100, 0.0));
    }

    #[test]
    fn spike_relative_to_previous_mean() {
        let mut tracker = TrafficAnomalyTracker::new(1_000_000);
        assert!(!tracker.observe("1.1.1.1", 100, 0.0));
        assert!(!tracker.observe("1.1.1.1", 100, 1.0));
        // mean of previous two samples is 100, +threshold exceeded
        assert!(tracker.observe("1.1.1.1", 1_000_200, 2.0));
    }

    #[test]
    fn gap_resets_accumulator() {
        let mut tracker = TrafficAnomalyTracker::new(1_000_000);
        tracker.observe("1.1.1.1", 900_000, 0.0);
        // gap > CONTINUOUS_GAP clears history, so this single sample is
        // judged alone against the threshold, not against the stale one.
        assert!(!tracker.observe("1.1.1.1", 900_000, 20.0));
    }

    #[test]
    fn sustained_activity_beyond_duration_is_anomaly() {
        let mut tracker = TrafficAnomalyTracker::new(1_000_000);
        // Each gap is well under CONTINUOUS_GAP (10s), so the accumulator
        // never resets and start_time stays pinned at 0.0; only once the
        // span since start_time exceeds CONTINUOUS_DURATION (60s) does the
        // sustained-activity branch fire.
        let mut last = false;
        for t in [0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 65.0] {
            last = tracker.observe("1.1.1.1", 10, t);
        }
        assert!(last);
    }
}
