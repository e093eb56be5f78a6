//! The seven-step annotation pipeline: consumes [`Observation`]s from a
//! packet source and turns each into a persisted, annotated [`Finding`].

mod traffic_anomaly;

pub use traffic_anomaly::TrafficAnomalyTracker;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{BusinessHours, DANGEROUS_PORTS, DANGEROUS_PROTOCOLS};
use crate::error::StoreError;
use crate::finding::{AnnotationPatch, Finding, GeoIp};
use crate::observation::Observation;
use crate::resolvers::{BlacklistMembership, CountryLookup, ReverseDns};
use crate::store::Store;

/// Owns exactly one capture session's worth of state: the shared resolvers
/// and Store are cloned `Arc`s, but the [`TrafficAnomalyTracker`] is fresh
/// per session and never shared.
pub struct Analyzer {
    store: Arc<Store>,
    country_lookup: Arc<dyn CountryLookup>,
    reverse_dns: Arc<dyn ReverseDns>,
    blacklist: Arc<dyn BlacklistMembership>,
    dangerous_countries: HashSet<String>,
    approved_macs: HashSet<String>,
    business_hours: BusinessHours,
    tracker: TrafficAnomalyTracker,
}

impl Analyzer {
    pub fn new(
        store: Arc<Store>,
        country_lookup: Arc<dyn CountryLookup>,
        reverse_dns: Arc<dyn ReverseDns>,
        blacklist: Arc<dyn BlacklistMembership>,
        dangerous_countries: HashSet<String>,
        approved_macs: HashSet<String>,
        business_hours: BusinessHours,
        traffic_threshold: u64,
    ) -> Self {
        Analyzer {
            store,
            country_lookup,
            reverse_dns,
            blacklist,
            dangerous_countries,
            approved_macs,
            business_hours,
            tracker: TrafficAnomalyTracker::new(traffic_threshold),
        }
    }

    /// Drains `rx` until it closes or `cancel` fires. Persistence failures
    /// for a single observation are logged and do not stop the loop — one
    /// bad write must not take down the whole session.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<Observation>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe_obs = rx.recv() => {
                    match maybe_obs {
                        Some(obs) => {
                            if let Err(e) = self.process(obs).await {
                                log::warn!("analyzer: failed to persist finding: {e}");
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    }

    /// Runs the seven annotation sub-steps in order and persists the
    /// result. Each sub-step fills in only the fields it knows about;
    /// earlier sub-steps' values are never overwritten (`Finding::merge_from`).
    async fn process(&mut self, obs: Observation) -> Result<Finding, StoreError> {
        let mut finding = Finding::from_observation(&obs);

        // 1. GeoIP + dangerous-country flag, applied together.
        if let Some(ip) = finding.src_ip.clone() {
            if let Some(country) = self.country_lookup.country(&ip).await {
                let dangerous = self.dangerous_countries.contains(&country.to_uppercase());
                finding.merge_from(&AnnotationPatch {
                    geoip: Some(GeoIp {
                        country: Some(country.clone()),
                        ip: ip.clone(),
                    }),
                    country_code: Some(country),
                    dangerous_country: Some(dangerous),
                    ..Default::default()
                });
            }
        }

        // 2. Reverse DNS, blacklist check, and a DNS-history row.
        if let Some(ip) = finding.src_ip.clone() {
            if let Some(host) = self.reverse_dns.reverse(&ip).await {
                let blacklisted = self.blacklist.is_blacklisted(&host);
                finding.merge_from(&AnnotationPatch {
                    reverse_dns: Some(host.clone()),
                    reverse_dns_blacklisted: Some(blacklisted),
                    ..Default::default()
                });
                if let Err(e) = self.store.save_dns(&ip, &host, blacklisted).await {
                    log::warn!("analyzer: failed to record dns history: {e}");
                }
            }
        }

        // 3. Dangerous protocol: by label or by either endpoint's port.
        let by_label = finding
            .protocol
            .as_deref()
            .map(|p| DANGEROUS_PROTOCOLS.contains(&p.to_lowercase().as_str()))
            .unwrap_or(false);
        let by_port = finding.src_port.map(|p| DANGEROUS_PORTS.contains(&p)).unwrap_or(false)
            || finding.dst_port.map(|p| DANGEROUS_PORTS.contains(&p)).unwrap_or(false);
        finding.merge_from(&AnnotationPatch {
            dangerous_protocol: Some(by_label || by_port),
            ..Default::default()
        });

        // 4 & 5. First-seen device tracking and unapproved-device check,
        // both keyed off the source MAC.
        if let Some(mac) = finding.src_mac.clone() {
            let mac = mac.to_lowercase();
            match self.store.record_device(&mac).await {
                Ok(is_new) => {
                    let unapproved = !self.approved_macs.contains(&mac);
                    finding.merge_from(&AnnotationPatch {
                        new_device: Some(is_new),
                        unapproved_device: Some(unapproved),
                        ..Default::default()
                    });
                }
                Err(e) => log::warn!("analyzer: failed to record device: {e}"),
            }
        }

        // 6. Traffic anomaly, keyed by source IP falling back to source MAC.
        if let Some(key) = finding.src_ip.clone().or_else(|| finding.src_mac.clone()) {
            let anomaly = self.tracker.observe(&key, finding.size as u64, obs.timestamp);
            finding.merge_from(&AnnotationPatch {
                traffic_anomaly: Some(anomaly),
                ..Default::default()
            });
        }

        // 7. Out-of-hours, derived from the observation's capture time.
        let out_of_hours = self.business_hours.is_out_of_hours(local_hour(obs.timestamp));
        finding.merge_from(&AnnotationPatch {
            out_of_hours: Some(out_of_hours),
            ..Default::default()
        });

        self.store.save_finding(finding).await
    }
}

/// Local hour-of-day for a wall-clock timestamp, falling back to UTC when
/// the local offset cannot be determined.
fn local_hour(timestamp: f64) -> u8 {
    let secs = timestamp.floor() as i64;
    let Ok(utc) = time::OffsetDateTime::from_unix_timestamp(secs) else {
        return 0;
    };
    let local = time::UtcOffset::local_offset_at(utc)
        .map(|off| utc.to_offset(off))
        .unwrap_or(utc);
    local.hour()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedCountry(Option<&'static str>);
    #[async_trait]
    impl CountryLookup for FixedCountry {
        async fn country(&self, _ip: &str) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    struct NoReverseDns;
    #[async_trait]
    impl ReverseDns for NoReverseDns {
        async fn reverse(&self, _ip: &str) -> Option<String> {
            None
        }
    }

    struct NeverBlacklisted;
    impl BlacklistMembership for NeverBlacklisted {
        fn is_blacklisted(&self, _host: &str) -> bool {
            false
        }
    }

    async fn make_analyzer(business_hours: BusinessHours) -> (Analyzer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("test.db")).unwrap());
        let analyzer = Analyzer::new(
            store,
            Arc::new(FixedCountry(Some("RU"))),
            Arc::new(NoReverseDns),
            Arc::new(NeverBlacklisted),
            HashSet::from(["RU".to_string()]),
            HashSet::new(),
            business_hours,
            1_000_000,
        );
        (analyzer, dir)
    }

    #[tokio::test]
    async fn dangerous_protocol_flagged_by_label() {
        let (mut analyzer, _dir) = make_analyzer(BusinessHours { start: 0, end: 24 }).await;
        let obs = Observation {
            src_ip: Some("1.1.1.1".into()),
            protocol: Some("FTP".into()),
            size: 10,
            timestamp: 1_700_000_000.0,
            ..Default::default()
        };
        let finding = analyzer.process(obs).await.unwrap();
        assert_eq!(finding.dangerous_protocol, Some(true));
    }

    #[tokio::test]
    async fn dangerous_protocol_flagged_by_port() {
        let (mut analyzer, _dir) = make_analyzer(BusinessHours { start: 0, end: 24 }).await;
        let obs = Observation {
            src_ip: Some("1.1.1.1".into()),
            dst_port: Some(3389),
            size: 10,
            timestamp: 1_700_000_000.0,
            ..Default::default()
        };
        let finding = analyzer.process(obs).await.unwrap();
        assert_eq!(finding.dangerous_protocol, Some(true));
    }

    #[tokio::test]
    async fn geoip_and_dangerous_country_are_applied_together() {
        let (mut analyzer, _dir) = make_analyzer(BusinessHours { start: 0, end: 24 }).await;
        let obs = Observation {
            src_ip: Some("8.8.8.8".into()),
            size: 10,
            timestamp: 1_700_000_000.0,
            ..Default::default()
        };
        let finding = analyzer.process(obs).await.unwrap();
        assert_eq!(finding.country_code.as_deref(), Some("RU"));
        assert_eq!(finding.dangerous_country, Some(true));
        assert!(finding.geoip.is_some());
    }

    #[tokio::test]
    async fn new_device_fires_once_and_unapproved_is_sticky() {
        let (mut analyzer, _dir) = make_analyzer(BusinessHours { start: 0, end: 24 }).await;
        let obs = Observation {
            src_mac: Some("AA:BB:CC:DD:EE:FF".into()),
            size: 10,
            timestamp: 1_700_000_000.0,
            ..Default::default()
        };
        let first = analyzer.process(obs.clone()).await.unwrap();
        assert_eq!(first.new_device, Some(true));
        assert_eq!(first.unapproved_device, Some(true));

        let second = analyzer.process(obs).await.unwrap();
        assert_eq!(second.new_device, Some(false));
    }

    #[tokio::test]
    async fn business_hours_outside_range_marks_out_of_hours() {
        let (mut analyzer, _dir) = make_analyzer(BusinessHours { start: 0, end: 0 }).await;
        let obs = Observation {
            src_ip: Some("1.1.1.1".into()),
            size: 10,
            timestamp: 1_700_000_000.0,
            ..Default::default()
        };
        let finding = analyzer.process(obs).await.unwrap();
        assert_eq!(finding.out_of_hours, Some(true));
    }
}
