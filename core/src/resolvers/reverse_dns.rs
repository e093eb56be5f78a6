use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

use super::ReverseDns;

const DEFAULT_CAPACITY: usize = 256;
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct CacheEntry {
    host: String,
    expires_at: Instant,
}

/// Reverse-DNS resolver with an LRU cache (capacity 256 by default) and a
/// TTL. Negative results are never cached, so a miss is retried on the
/// next call.
pub struct CachingReverseDns {
    cache: Mutex<LruCache<IpAddr, CacheEntry>>,
    ttl: Duration,
}

impl CachingReverseDns {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        CachingReverseDns {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
            ttl,
        }
    }

    fn cached(&self, ip: IpAddr) -> Option<String> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(entry) = cache.get(&ip) {
            if Instant::now() < entry.expires_at {
                return Some(entry.host.clone());
            }
            cache.pop(&ip);
        }
        None
    }

    fn remember(&self, ip: IpAddr, host: String) {
        let mut cache = self.cache.lock().unwrap();
        cache.put(
            ip,
            CacheEntry {
                host,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

impl Default for CachingReverseDns {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReverseDns for CachingReverseDns {
    async fn reverse(&self, ip: &str) -> Option<String> {
        let addr: IpAddr = ip.parse().ok()?;
        if let Some(host) = self.cached(addr) {
            return Some(host);
        }
        let result = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr).ok())
            .await
            .ok()
            .flatten();
        let host = normalize(result?);
        self.remember(addr, host.clone());
        Some(host)
    }
}

fn normalize(mut host: String) -> String {
    if host.ends_with('.') {
        host.pop();
    }
    host.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_trailing_dot_and_lowercases() {
        assert_eq!(normalize("Host.Example.".to_string()), "host.example");
    }

    #[tokio::test]
    async fn cache_hit_skips_expiry_before_ttl() {
        let resolver = CachingReverseDns::with_capacity_and_ttl(4, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        resolver.remember(ip, "localhost".to_string());
        assert_eq!(resolver.cached(ip), Some("localhost".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_is_evicted() {
        let resolver = CachingReverseDns::with_capacity_and_ttl(4, Duration::from_millis(1));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        resolver.remember(ip, "localhost".to_string());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(resolver.cached(ip), None);
    }
}
