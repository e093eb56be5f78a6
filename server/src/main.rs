//! `lanwarden-server`: wires the `lanwarden-core` dynamic-scan pipeline and
//! static-scan orchestrator to an `actix-web` HTTP/WebSocket surface.
//! Everything that matters — capture, analysis, persistence, scheduling —
//! lives in `lanwarden-core` and is testable without this binary; this
//! file is startup wiring only.

mod auth;
mod errors;
mod routes;
mod state;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};

use lanwarden_core::config::{self, BusinessHours};
use lanwarden_core::resolvers::{
    BlacklistMembership, CachingReverseDns, ChainedCountryLookup, CountryLookup, FileBlacklist,
    HttpFallbackGeoIp, MaxMindGeoIp, ReverseDns,
};
use lanwarden_core::scheduler::{self, Scheduler, DEFAULT_BLACKLIST_INTERVAL_HOURS};
use lanwarden_core::source::LivePacketSource;
use lanwarden_core::static_scan::{self, DEFAULT_PROBE_TIMEOUT};
use lanwarden_core::store::Store;

use crate::auth::BearerAuth;
use crate::state::AppState;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_secs),
    )
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv::dotenv();
    env_logger::init();

    let host = env_or("APP_HOST", "127.0.0.1");
    let port: u16 = env_or("APP_PORT", "8080").parse().unwrap_or(8080);

    let db_path = PathBuf::from(env_or("SQLITE_PATH", "data/lanwarden.db"));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let reports_dir = PathBuf::from(env_or("REPORTS_DIR", "reports"));

    let approved_macs = config::load_approved_macs(&PathBuf::from(env_or(
        "APPROVED_DEVICES_PATH",
        "configs/approved_devices.json",
    )));
    let dangerous_countries = config::load_dangerous_countries(&PathBuf::from(env_or(
        "DANGEROUS_COUNTRIES_PATH",
        "configs/dangerous_countries.json",
    )));
    let traffic_threshold = config::load_traffic_threshold(&PathBuf::from(env_or(
        "TRAFFIC_THRESHOLD_CONFIG_PATH",
        "configs/traffic_threshold.json",
    )));
    let business_hours = BusinessHours {
        start: env_or("BUSINESS_HOURS_START", "9").parse().unwrap_or(9),
        end: env_or("BUSINESS_HOURS_END", "17").parse().unwrap_or(17),
    };

    let blacklist_path = PathBuf::from(env_or("DNS_BLACKLIST_PATH", "data/dns_blacklist.txt"));
    if let Some(parent) = blacklist_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let geoip_db_path = env_or("GEOIP_DB_PATH", "/usr/share/GeoIP/GeoLite2-Country.mmdb");
    let country_lookup: Arc<dyn CountryLookup> = Arc::new(ChainedCountryLookup::new(
        MaxMindGeoIp::with_path(geoip_db_path),
        HttpFallbackGeoIp::new(),
    ));
    let reverse_dns: Arc<dyn ReverseDns> = Arc::new(CachingReverseDns::new());
    let blacklist: Arc<dyn BlacklistMembership> = Arc::new(FileBlacklist::load(&blacklist_path));

    let store = Arc::new(Store::open(&db_path).expect("failed to open store database"));

    let scheduler = Scheduler::new(
        Arc::clone(&store),
        Arc::new(LivePacketSource::new()),
        country_lookup,
        reverse_dns,
        blacklist,
        dangerous_countries,
        approved_macs,
        business_hours,
        traffic_threshold,
    );

    if let Ok(feed_url) = env::var("BLACKLIST_FEED_URL") {
        let interval_hours = env_or(
            "BLACKLIST_UPDATE_INTERVAL_HOURS",
            &DEFAULT_BLACKLIST_INTERVAL_HOURS.to_string(),
        )
        .parse()
        .unwrap_or(DEFAULT_BLACKLIST_INTERVAL_HOURS);

        let cron = tokio_cron_scheduler::JobScheduler::new()
            .await
            .expect("failed to start blacklist job scheduler");
        scheduler::spawn_blacklist_job(
            &cron,
            reqwest::Client::new(),
            feed_url,
            blacklist_path.clone(),
            interval_hours,
        )
        .await
        .expect("failed to register blacklist update job");
        cron.start().await.expect("failed to start cron scheduler");
        log::info!("blacklist feed refresh registered, every {interval_hours}h");
    } else {
        log::info!("BLACKLIST_FEED_URL not set, blacklist refresh job disabled");
    }

    let static_scan_target = env_or("STATIC_SCAN_TARGET", "127.0.0.1");
    let static_scan_dns_domain = env_or("STATIC_SCAN_DNS_DOMAIN", "example.com");
    let probes = static_scan::default_probes(static_scan_target, static_scan_dns_domain);

    let data = web::Data::new(AppState {
        store,
        scheduler,
        probes,
        probe_timeout: DEFAULT_PROBE_TIMEOUT,
        static_scan_global_timeout: env_duration_secs("STATIC_SCAN_GLOBAL_TIMEOUT_SECS", 30),
        reports_dir,
    });

    let api_token = env::var("API_TOKEN").ok();
    if api_token.is_some() {
        log::info!("API_TOKEN set: all non-health routes require bearer auth");
    } else {
        log::warn!("API_TOKEN not set: all routes are open");
    }

    log::info!("lanwarden-server listening on {host}:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(actix_web::middleware::Logger::default())
            .wrap(BearerAuth::new(api_token.clone()))
            .service(routes::health::health)
            .route("/scan/dynamic/start", web::post().to(routes::dynamic_scan::start))
            .route("/dynamic-scan/start", web::post().to(routes::dynamic_scan::start))
            .route("/dynamic_scan/start", web::post().to(routes::dynamic_scan::start))
            .route("/scan/dynamic/stop", web::post().to(routes::dynamic_scan::stop))
            .route("/dynamic-scan/stop", web::post().to(routes::dynamic_scan::stop))
            .route("/dynamic_scan/stop", web::post().to(routes::dynamic_scan::stop))
            .route("/scan/dynamic/results", web::get().to(routes::dynamic_scan::results))
            .route("/dynamic-scan/results", web::get().to(routes::dynamic_scan::results))
            .route("/dynamic_scan/results", web::get().to(routes::dynamic_scan::results))
            .route("/scan/dynamic/history", web::get().to(routes::dynamic_scan::history))
            .route("/dynamic-scan/history", web::get().to(routes::dynamic_scan::history))
            .route("/dynamic_scan/history", web::get().to(routes::dynamic_scan::history))
            .route("/dynamic-scan/dns-history", web::get().to(routes::dynamic_scan::dns_history))
            .route("/ws/scan/dynamic", web::get().to(routes::ws::findings_ws))
            .route("/ws/dynamic-scan", web::get().to(routes::ws::findings_ws))
            .route("/ws/device-alerts", web::get().to(routes::ws::device_alerts_ws))
            .route("/static_scan", web::get().to(routes::static_scan::static_scan))
    })
    .bind((host, port))?
    .run()
    .await
}
