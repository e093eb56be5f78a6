//! Durable history of findings, DNS resolutions, and known devices; a
//! bounded in-memory recent buffer; and live fan-out to subscribers.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::finding::Finding;

/// Default capacity of the in-memory recent-findings ring buffer.
pub const DEFAULT_RECENT_CAPACITY: usize = 100;
/// Default capacity of each subscriber's broadcast channel. A subscriber
/// that falls more than this many messages behind observes a `Lagged`
/// error and resumes from the next available message — the broadcast
/// channel's built-in drop-oldest-for-slow-readers behavior means a slow
/// subscriber never back-pressures `save_finding`, without the Store
/// having to track per-subscriber failure counts itself.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// A device-alert event: the first time a MAC address is ever observed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceAlert {
    pub mac: String,
    pub first_seen: String,
}

/// A DNS history row (`dns_history` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DnsRow {
    pub timestamp: String,
    pub ip: String,
    pub hostname: String,
    pub blacklisted: bool,
}

/// Query parameters for [`Store::fetch_history`]. Missing fields widen the
/// query.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub start: Option<String>,
    pub end: Option<String>,
    pub device: Option<String>,
    pub protocol: Option<String>,
}

pub struct Store {
    pool: Pool<SqliteConnectionManager>,
    recent: Mutex<VecDeque<Finding>>,
    recent_capacity: usize,
    known_devices: tokio::sync::Mutex<HashSet<String>>,
    finding_tx: broadcast::Sender<Finding>,
    device_alert_tx: broadcast::Sender<DeviceAlert>,
}

impl Store {
    /// Opens (creating if absent) the SQLite database at `path`, running
    /// migrations and loading the known-device set into memory.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with_capacity(path, DEFAULT_RECENT_CAPACITY)
    }

    pub fn open_with_capacity(path: &Path, recent_capacity: usize) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::new(manager).map_err(StoreError::Pool)?;
        {
            let conn = pool.get().map_err(StoreError::Pool)?;
            conn.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                CREATE TABLE IF NOT EXISTS results(
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    data TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS dns_history(
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT,
                    ip TEXT,
                    hostname TEXT,
                    blacklisted INTEGER
                );
                CREATE TABLE IF NOT EXISTS devices(
                    mac TEXT PRIMARY KEY,
                    first_seen TEXT NOT NULL
                );
                "#,
            )?;
        }

        let known_devices = load_known_devices(&pool)?;
        let (finding_tx, _) = broadcast::channel(DEFAULT_SUBSCRIBER_CAPACITY);
        let (device_alert_tx, _) = broadcast::channel(DEFAULT_SUBSCRIBER_CAPACITY);

        Ok(Store {
            pool,
            recent: Mutex::new(VecDeque::with_capacity(recent_capacity)),
            recent_capacity,
            known_devices: tokio::sync::Mutex::new(known_devices),
            finding_tx,
            device_alert_tx,
        })
    }

    /// Persist a finding, stamping its timestamp at save time, pushing it
    /// into the bounded recent buffer, and broadcasting it to subscribers.
    /// The write is committed before this returns.
    pub async fn save_finding(&self, mut finding: Finding) -> Result<Finding, StoreError> {
        finding.timestamp = now_iso_local();
        let data = serde_json::to_string(&finding)?;
        let ts = finding.timestamp.clone();
        let pool = self.pool.clone();

        run_blocking(move || {
            let conn = pool.get().map_err(StoreError::Pool)?;
            conn.execute(
                "INSERT INTO results (timestamp, data) VALUES (?1, ?2)",
                params![ts, data],
            )?;
            Ok(())
        })
        .await?;

        {
            let mut recent = self.recent.lock().unwrap();
            recent.push_back(finding.clone());
            while recent.len() > self.recent_capacity {
                recent.pop_front();
            }
        }
        let _ = self.finding_tx.send(finding.clone());
        Ok(finding)
    }

    /// Append a DNS resolution row.
    pub async fn save_dns(&self, ip: &str, hostname: &str, blacklisted: bool) -> Result<(), StoreError> {
        let ts = now_iso_local();
        let ip = ip.to_string();
        let hostname = hostname.to_string();
        let pool = self.pool.clone();
        run_blocking(move || {
            let conn = pool.get().map_err(StoreError::Pool)?;
            conn.execute(
                "INSERT INTO dns_history (timestamp, ip, hostname, blacklisted) VALUES (?1, ?2, ?3, ?4)",
                params![ts, ip, hostname, blacklisted as i64],
            )?;
            Ok(())
        })
        .await
    }

    /// Records `mac` in the known-device set/table if not already present.
    /// Returns whether it was newly inserted; if so, also broadcasts a
    /// device alert. The known-device set is process-lifetime and global:
    /// "new" means first time this process has ever seen the MAC, not
    /// first time in the current scan session.
    pub async fn record_device(&self, mac: &str) -> Result<bool, StoreError> {
        let mac = mac.to_lowercase();
        let mut known = self.known_devices.lock().await;
        if known.contains(&mac) {
            return Ok(false);
        }

        let first_seen = now_iso_local();
        let pool = self.pool.clone();
        let mac_db = mac.clone();
        let ts_db = first_seen.clone();
        run_blocking(move || {
            let conn = pool.get().map_err(StoreError::Pool)?;
            conn.execute(
                "INSERT OR IGNORE INTO devices (mac, first_seen) VALUES (?1, ?2)",
                params![mac_db, ts_db],
            )?;
            Ok(())
        })
        .await?;

        known.insert(mac.clone());
        let _ = self.device_alert_tx.send(DeviceAlert { mac, first_seen });
        Ok(true)
    }

    /// Snapshot of the bounded recent-findings buffer.
    pub fn get_recent(&self) -> Vec<Finding> {
        self.recent.lock().unwrap().iter().cloned().collect()
    }

    /// Parameterized query over the `results` table, widened by any
    /// missing filter field. Results are ordered by insertion (row id).
    pub async fn fetch_history(&self, filter: HistoryFilter) -> Result<Vec<Finding>, StoreError> {
        let pool = self.pool.clone();
        run_blocking(move || {
            let conn = pool.get().map_err(StoreError::Pool)?;
            let mut sql = String::from("SELECT data FROM results WHERE 1=1");
            let mut binds: Vec<String> = Vec::new();
            if let Some(start) = &filter.start {
                sql.push_str(" AND timestamp >= ?");
                binds.push(start.clone());
            }
            if let Some(end) = &filter.end {
                sql.push_str(" AND timestamp <= ?");
                binds.push(end.clone());
            }
            sql.push_str(" ORDER BY id ASC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(binds.iter()), |row| {
                row.get::<_, String>(0)
            })?;

            let mut findings = Vec::new();
            for row in rows {
                let data = row?;
                let finding: Finding = serde_json::from_str(&data)?;
                if let Some(device) = &filter.device {
                    if finding.src_ip.as_deref() != Some(device.as_str()) {
                        continue;
                    }
                }
                if let Some(protocol) = &filter.protocol {
                    if finding.protocol.as_deref() != Some(protocol.as_str()) {
                        continue;
                    }
                }
                findings.push(finding);
            }
            Ok(findings)
        })
        .await
    }

    /// Rows whose date-only timestamp prefix (`YYYY-MM-DD`) falls within
    /// `[start_date, end_date]` inclusive, oldest first.
    pub async fn fetch_dns_history(
        &self,
        start_date: String,
        end_date: String,
    ) -> Result<Vec<DnsRow>, StoreError> {
        let pool = self.pool.clone();
        run_blocking(move || {
            let conn = pool.get().map_err(StoreError::Pool)?;
            let mut stmt = conn.prepare(
                "SELECT timestamp, ip, hostname, blacklisted FROM dns_history \
                 WHERE substr(timestamp, 1, 10) BETWEEN ?1 AND ?2 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![start_date, end_date], |row| {
                Ok(DnsRow {
                    timestamp: row.get(0)?,
                    ip: row.get(1)?,
                    hostname: row.get(2)?,
                    blacklisted: row.get::<_, i64>(3)? != 0,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    /// Subscribe to the live finding stream. Dropping the receiver is the
    /// unsubscribe — `tokio::sync::broadcast` frees the slot automatically.
    pub fn subscribe_findings(&self) -> broadcast::Receiver<Finding> {
        self.finding_tx.subscribe()
    }

    /// Subscribe to device-first-seen alerts.
    pub fn subscribe_device_alerts(&self) -> broadcast::Receiver<DeviceAlert> {
        self.device_alert_tx.subscribe()
    }
}

fn load_known_devices(pool: &Pool<SqliteConnectionManager>) -> Result<HashSet<String>, StoreError> {
    let conn = pool.get().map_err(StoreError::Pool)?;
    let mut stmt = conn.prepare("SELECT mac FROM devices")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut set = HashSet::new();
    for row in rows {
        set.insert(row?);
    }
    Ok(set)
}

/// Current local time as an RFC-3339 string with explicit offset and
/// seconds precision, falling back to UTC if the local offset cannot be
/// determined (containers/sandboxes commonly lack `/etc/localtime`).
fn now_iso_local() -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    now.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| now.to_string())
}

async fn run_blocking<F, T>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;

    fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn save_finding_stamps_timestamp_and_fans_out() {
        let (store, _dir) = temp_store();
        let mut rx = store.subscribe_findings();
        let obs = Observation {
            src_ip: Some("1.1.1.1".into()),
            size: 10,
            ..Default::default()
        };
        let finding = Finding::from_observation(&obs);
        let saved = store.save_finding(finding).await.unwrap();
        assert!(!saved.timestamp.is_empty());

        let broadcast = rx.recv().await.unwrap();
        assert_eq!(broadcast.src_ip, Some("1.1.1.1".to_string()));
    }

    #[tokio::test]
    async fn recent_buffer_never_exceeds_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_with_capacity(&dir.path().join("test.db"), 2).unwrap();
        for i in 0..5 {
            let obs = Observation {
                src_ip: Some(format!("1.1.1.{i}")),
                size: 1,
                ..Default::default()
            };
            store
                .save_finding(Finding::from_observation(&obs))
                .await
                .unwrap();
        }
        assert_eq!(store.get_recent().len(), 2);
    }

    #[tokio::test]
    async fn record_device_only_fires_once() {
        let (store, _dir) = temp_store();
        let mut alerts = store.subscribe_device_alerts();
        assert!(store.record_device("AA:BB:CC:DD:EE:FF").await.unwrap());
        assert!(!store.record_device("aa:bb:cc:dd:ee:ff").await.unwrap());
        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.mac, "aa:bb:cc:dd:ee:ff");
    }

    #[tokio::test]
    async fn history_filter_by_device_and_protocol() {
        let (store, _dir) = temp_store();
        let a = Finding {
            src_ip: Some("1.1.1.1".into()),
            protocol: Some("http".into()),
            ..Default::default()
        };
        let b = Finding {
            src_ip: Some("2.2.2.2".into()),
            protocol: Some("ftp".into()),
            ..Default::default()
        };
        store.save_finding(a).await.unwrap();
        store.save_finding(b).await.unwrap();

        let by_device = store
            .fetch_history(HistoryFilter {
                device: Some("2.2.2.2".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_device.len(), 1);
        assert_eq!(by_device[0].src_ip.as_deref(), Some("2.2.2.2"));

        let by_protocol = store
            .fetch_history(HistoryFilter {
                protocol: Some("ftp".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_protocol.len(), 1);

        let all = store.fetch_history(HistoryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].src_ip.as_deref(), Some("1.1.1.1"));
        assert_eq!(all[1].src_ip.as_deref(), Some("2.2.2.2"));
    }
}
