//! Supervises the scan-session lifecycle: `start` kicks off an immediate
//! capture+analyze session and schedules the next one `interval` later;
//! `stop` cancels whatever is in flight. A second, independent job
//! refreshes the blacklist feed on its own interval.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::analyzer::Analyzer;
use crate::config::BusinessHours;
use crate::error::CaptureError;
use crate::resolvers::{BlacklistMembership, CountryLookup, ReverseDns};
use crate::source::{CaptureSession, PacketSource};
use crate::store::Store;

/// Default scan-job cadence when no `interval` is given in the start
/// request.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(3600);
/// Default blacklist-feed refresh cadence, in hours.
pub const DEFAULT_BLACKLIST_INTERVAL_HOURS: u64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Scheduled,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
}

/// Parameters for one scan cycle, taken from the HTTP start request with
/// documented defaults applied by the caller.
#[derive(Debug, Clone)]
pub struct ScanParams {
    pub interface: Option<String>,
    pub duration: Duration,
    pub interval: Duration,
    pub approved_macs: Option<HashSet<String>>,
}

impl Default for ScanParams {
    fn default() -> Self {
        ScanParams {
            interface: None,
            duration: Duration::from_secs(60),
            interval: DEFAULT_SCAN_INTERVAL,
            approved_macs: None,
        }
    }
}

struct Session {
    cancel: CancellationToken,
    capture: JoinHandle<Result<(), CaptureError>>,
    analyze: JoinHandle<()>,
}

/// Owns the in-flight scan session, if any, plus the repeating ticker
/// task that re-triggers it. State machine: `Idle -> Running` on `start`,
/// `Running -> Idle` on `stop`. `start` while running is a no-op that
/// returns `AlreadyRunning` without disturbing the current session;
/// `stop` is idempotent.
pub struct Scheduler {
    store: Arc<Store>,
    packet_source: Arc<dyn PacketSource>,
    country_lookup: Arc<dyn CountryLookup>,
    reverse_dns: Arc<dyn ReverseDns>,
    blacklist: Arc<dyn BlacklistMembership>,
    dangerous_countries: HashSet<String>,
    default_approved_macs: HashSet<String>,
    business_hours: BusinessHours,
    traffic_threshold: u64,
    session: AsyncMutex<Option<Session>>,
    ticker: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        packet_source: Arc<dyn PacketSource>,
        country_lookup: Arc<dyn CountryLookup>,
        reverse_dns: Arc<dyn ReverseDns>,
        blacklist: Arc<dyn BlacklistMembership>,
        dangerous_countries: HashSet<String>,
        default_approved_macs: HashSet<String>,
        business_hours: BusinessHours,
        traffic_threshold: u64,
    ) -> Arc<Self> {
        Arc::new(Scheduler {
            store,
            packet_source,
            country_lookup,
            reverse_dns,
            blacklist,
            dangerous_countries,
            default_approved_macs,
            business_hours,
            traffic_threshold,
            session: AsyncMutex::new(None),
            ticker: AsyncMutex::new(None),
        })
    }

    /// Starts an immediate session and arms the repeating ticker. A
    /// session already running (or a ticker already armed) makes this a
    /// no-op that reports `AlreadyRunning`.
    pub async fn start(self: &Arc<Self>, params: ScanParams) -> StartOutcome {
        let mut session_guard = self.session.lock().await;
        let mut ticker_guard = self.ticker.lock().await;
        drain_if_finished(&mut session_guard).await;
        if session_guard.is_some() || ticker_guard.is_some() {
            return StartOutcome::AlreadyRunning;
        }

        *session_guard = Some(self.spawn_session(&params).await);
        drop(session_guard);

        let this = Arc::clone(self);
        let interval = params.interval;
        let repeat_params = params;
        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.tick().await; // the first tick fires immediately; already covered above
            loop {
                ticks.tick().await;
                let mut guard = this.session.lock().await;
                drain_if_finished(&mut guard).await;
                if guard.is_some() {
                    log::warn!("scheduler: previous scan session still running, skipping this tick");
                    continue;
                }
                *guard = Some(this.spawn_session(&repeat_params).await);
            }
        });
        *ticker_guard = Some(handle);

        StartOutcome::Scheduled
    }

    /// Cancels the in-flight session (the Source first, then the Analyzer
    /// drains and observes the close), waits for both tasks, and disarms
    /// the ticker. Safe to call when nothing is running.
    pub async fn stop(&self) -> StopOutcome {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
        if let Some(session) = self.session.lock().await.take() {
            session.cancel.cancel();
            let _ = session.capture.await;
            let _ = session.analyze.await;
        }
        StopOutcome::Stopped
    }

    /// True while a session is currently in flight. A session that has
    /// finished on its own (capture hit its duration deadline, or the
    /// analyzer drained to a closed channel) is reaped first, so this does
    /// not stay `true` forever between ticks.
    pub async fn is_running(&self) -> bool {
        let mut guard = self.session.lock().await;
        drain_if_finished(&mut guard).await;
        guard.is_some()
    }

    async fn spawn_session(&self, params: &ScanParams) -> Session {
        let cancel = CancellationToken::new();
        let approved_macs = params
            .approved_macs
            .clone()
            .unwrap_or_else(|| self.default_approved_macs.clone());

        let CaptureSession { rx, handle: capture } = self
            .packet_source
            .start(params.interface.clone(), Some(params.duration), cancel.clone())
            .await;

        let mut analyzer = Analyzer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.country_lookup),
            Arc::clone(&self.reverse_dns),
            Arc::clone(&self.blacklist),
            self.dangerous_countries.clone(),
            approved_macs,
            self.business_hours,
            self.traffic_threshold,
        );
        let analyze_cancel = cancel.clone();
        let analyze = tokio::spawn(async move {
            analyzer.run(rx, analyze_cancel).await;
        });

        Session {
            cancel,
            capture,
            analyze,
        }
    }
}

/// Takes the session out of `slot` and clears it if both its tasks have
/// already finished on their own — a scan that ran to its configured
/// `duration` without an explicit `stop` otherwise leaves the slot
/// occupied forever, since nothing else ever clears it. Awaiting the
/// handles here is effectively instant: both are already done.
async fn drain_if_finished(slot: &mut Option<Session>) {
    let finished = matches!(slot, Some(s) if s.capture.is_finished() && s.analyze.is_finished());
    if !finished {
        return;
    }
    if let Some(session) = slot.take() {
        if let Err(e) = session.capture.await {
            log::warn!("scheduler: capture task panicked: {e}");
        }
        if let Err(e) = session.analyze.await {
            log::warn!("scheduler: analyze task panicked: {e}");
        }
    }
}

/// Registers the periodic blacklist-feed refresh job on `scheduler`. Only
/// wired up by the server when a feed URL is configured. Update failures
/// are logged and leave the on-disk blacklist untouched.
pub async fn spawn_blacklist_job(
    scheduler: &tokio_cron_scheduler::JobScheduler,
    client: reqwest::Client,
    feed_url: String,
    blacklist_path: std::path::PathBuf,
    interval_hours: u64,
) -> Result<(), tokio_cron_scheduler::JobSchedulerError> {
    let job = tokio_cron_scheduler::Job::new_repeated_async(
        Duration::from_secs(interval_hours * 3600),
        move |_uuid, _l| {
            let client = client.clone();
            let feed_url = feed_url.clone();
            let blacklist_path = blacklist_path.clone();
            Box::pin(async move {
                match crate::blacklist_updater::update(&client, &feed_url, &blacklist_path).await {
                    Ok(n) => log::info!("blacklist updater: merged feed, {n} entries now on disk"),
                    Err(e) => log::warn!("blacklist updater: update failed, existing file untouched: {e}"),
                }
            })
        },
    )?;
    scheduler.add(job).await?;
    Ok(())
}
