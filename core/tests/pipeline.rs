//! End-to-end exercise of capture channel -> Analyzer -> Store, without a
//! real packet source or network-backed resolver.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lanwarden_core::analyzer::Analyzer;
use lanwarden_core::config::BusinessHours;
use lanwarden_core::observation::Observation;
use lanwarden_core::resolvers::{BlacklistMembership, CountryLookup, ReverseDns};
use lanwarden_core::store::Store;

struct NoCountry;
#[async_trait]
impl CountryLookup for NoCountry {
    async fn country(&self, _ip: &str) -> Option<String> {
        None
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

#[tokio::test]
async fn observations_pushed_through_the_channel_are_persisted_and_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(&dir.path().join("pipeline.db")).unwrap());
    let mut subscriber = store.subscribe_findings();

    let mut analyzer = Analyzer::new(
        Arc::clone(&store),
        Arc::new(NoCountry),
        Arc::new(NoReverseDns),
        Arc::new(NeverBlacklisted),
        HashSet::new(),
        HashSet::new(),
        BusinessHours::default(),
        1_000_000,
    );

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let run_handle = tokio::spawn(async move {
        analyzer.run(rx, run_cancel).await;
    });

    for i in 0..3 {
        tx.send(Observation {
            src_ip: Some(format!("10.0.0.{i}")),
            src_mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
            protocol: Some("telnet".to_string()),
            size: 64,
            timestamp: 1_700_000_000.0,
            ..Default::default()
        })
        .await
        .unwrap();
    }
    drop(tx);
    run_handle.await.unwrap();

    let recent = store.get_recent();
    assert_eq!(recent.len(), 3);
    assert!(recent.iter().all(|f| f.dangerous_protocol == Some(true)));

    for _ in 0..3 {
        let broadcast = subscriber.recv().await.unwrap();
        assert_eq!(broadcast.dangerous_protocol, Some(true));
    }
}

#[tokio::test]
async fn cancellation_stops_the_loop_without_draining_remaining_input() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(&dir.path().join("pipeline_cancel.db")).unwrap());

    let mut analyzer = Analyzer::new(
        Arc::clone(&store),
        Arc::new(NoCountry),
        Arc::new(NoReverseDns),
        Arc::new(NeverBlacklisted),
        HashSet::new(),
        HashSet::new(),
        BusinessHours::default(),
        1_000_000,
    );

    let (_tx, rx) = tokio::sync::mpsc::channel(8);
    let cancel = CancellationToken::new();
    cancel.cancel();
    analyzer.run(rx, cancel).await;

    assert!(store.get_recent().is_empty());
}
