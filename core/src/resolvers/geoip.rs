use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use super::CountryLookup;

const DEFAULT_DB_PATH: &str = "/usr/share/GeoIP/GeoLite2-Country.mmdb";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Local GeoLite2 database lookup, consulted first. Missing or unreadable
/// databases make every lookup return `None` rather than fail — this
/// resolver must never raise.
pub struct MaxMindGeoIp {
    db_path: PathBuf,
}

impl MaxMindGeoIp {
    pub fn new() -> Self {
        Self::with_path(DEFAULT_DB_PATH)
    }

    pub fn with_path(path: impl AsRef<Path>) -> Self {
        MaxMindGeoIp {
            db_path: path.as_ref().to_path_buf(),
        }
    }
}

impl Default for MaxMindGeoIp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CountryLookup for MaxMindGeoIp {
    async fn country(&self, ip: &str) -> Option<String> {
        let db_path = self.db_path.clone();
        let ip = ip.to_string();
        tokio::task::spawn_blocking(move || lookup_local(&db_path, &ip))
            .await
            .ok()
            .flatten()
    }
}

fn lookup_local(db_path: &Path, ip: &str) -> Option<String> {
    let reader = maxminddb::Reader::open_readfile(db_path).ok()?;
    let addr: std::net::IpAddr = ip.parse().ok()?;
    let country: maxminddb::geoip2::Country = reader.lookup(addr).ok()?;
    let code = country.country?.iso_code?;
    Some(code.to_uppercase())
}

/// `ipapi.co` HTTP fallback, used when the local database misses or is
/// absent. Any network failure yields `None`.
pub struct HttpFallbackGeoIp {
    client: reqwest::Client,
}

impl HttpFallbackGeoIp {
    pub fn new() -> Self {
        HttpFallbackGeoIp {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

impl Default for HttpFallbackGeoIp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CountryLookup for HttpFallbackGeoIp {
    async fn country(&self, ip: &str) -> Option<String> {
        let url = format!("https://ipapi.co/{ip}/country/");
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let text = resp.text().await.ok()?;
        let code = text.trim().to_uppercase();
        if code.len() == 2 {
            Some(code)
        } else {
            debug!("ipapi.co returned unexpected body for {ip}: {text}");
            None
        }
    }
}

/// Tries `primary`, falling back to `secondary` on a miss.
pub struct ChainedCountryLookup<A, B> {
    primary: A,
    secondary: B,
}

impl<A: CountryLookup, B: CountryLookup> ChainedCountryLookup<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        ChainedCountryLookup { primary, secondary }
    }
}

#[async_trait]
impl<A: CountryLookup, B: CountryLookup> CountryLookup for ChainedCountryLookup<A, B> {
    async fn country(&self, ip: &str) -> Option<String> {
        if let Some(code) = self.primary.country(ip).await {
            return Some(code);
        }
        self.secondary.country(ip).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always(Option<&'static str>);

    #[async_trait]
    impl CountryLookup for Always {
        async fn country(&self, _ip: &str) -> Option<String> {
            self.0.map(|s| s.to_string())
        }
    }

    #[tokio::test]
    async fn chain_falls_back_on_primary_miss() {
        let chain = ChainedCountryLookup::new(Always(None), Always(Some("CN")));
        assert_eq!(chain.country("1.1.1.1").await, Some("CN".to_string()));
    }

    #[tokio::test]
    async fn chain_prefers_primary() {
        let chain = ChainedCountryLookup::new(Always(Some("US")), Always(Some("CN")));
        assert_eq!(chain.country("1.1.1.1").await, Some("US".to_string()));
    }

    #[tokio::test]
    async fn missing_local_db_never_panics() {
        let resolver = MaxMindGeoIp::with_path("/nonexistent/db.mmdb");
        assert_eq!(resolver.country("1.1.1.1").await, None);
    }
}
